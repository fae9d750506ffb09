//! Human-readable tables.

use comfy_table::{Table, presets::UTF8_FULL};
use shipyard_deploy::{DeploymentRecord, DeploymentReport, SpecState};

/// Number of args hash characters shown in tables.
const SHORT_HASH_LEN: usize = 16;

fn short_hash(hash: &str) -> String {
    hash.chars().take(SHORT_HASH_LEN).collect()
}

/// One row per selected deployment of a run.
pub fn report_table(report: &DeploymentReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "State", "Address", "Args hash", "Details"]);

    for outcome in &report.outcomes {
        let (address, args_hash) = match &outcome.record {
            Some(record) => (
                record.address.to_checksum(None),
                short_hash(&record.args_hash),
            ),
            None => (String::new(), String::new()),
        };

        let details = match outcome.state {
            SpecState::Recorded => outcome
                .record
                .as_ref()
                .map(|record| format!("tx {}", record.transaction_hash))
                .unwrap_or_default(),
            SpecState::Skipped => "already deployed".to_string(),
            SpecState::Failed => outcome
                .error
                .as_ref()
                .map(|err| format!("[{}] {err}", err.class()))
                .unwrap_or_default(),
            SpecState::Blocked => outcome.blocked_by.clone().unwrap_or_default(),
            SpecState::Pending | SpecState::Deploying => String::new(),
        };

        table.add_row(vec![
            outcome.name.clone(),
            outcome.state.to_string(),
            address,
            args_hash,
            details,
        ]);
    }

    table
}

/// One row per stored record.
pub fn records_table(records: &[DeploymentRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Contract",
        "Address",
        "Block",
        "Args hash",
        "Deployer",
        "Transaction",
    ]);

    for record in records {
        table.add_row(vec![
            record.contract_name.clone(),
            record.address.to_checksum(None),
            record.block_number.to_string(),
            short_hash(&record.args_hash),
            record.deployer.to_checksum(None),
            record.transaction_hash.to_string(),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use shipyard_deploy::{DeployError, SpecOutcome};

    use super::*;

    #[test]
    fn test_report_table_lists_every_outcome() {
        let report = DeploymentReport {
            network: "localhost".to_string(),
            outcomes: vec![
                SpecOutcome {
                    name: "Token".to_string(),
                    state: SpecState::Failed,
                    record: None,
                    error: Some(DeployError::Network("connection refused".to_string())),
                    blocked_by: None,
                },
                SpecOutcome {
                    name: "Vault".to_string(),
                    state: SpecState::Blocked,
                    record: None,
                    error: None,
                    blocked_by: Some("dependency `Token` has no record".to_string()),
                },
            ],
            aborted: None,
        };

        let rendered = report_table(&report).to_string();
        assert!(rendered.contains("FAILED"));
        assert!(rendered.contains("[network]"));
        assert!(rendered.contains("BLOCKED"));
        assert!(rendered.contains("Vault"));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef0123"), "0123456789abcdef");
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash(&"€".repeat(20)), "€".repeat(SHORT_HASH_LEN));
    }
}

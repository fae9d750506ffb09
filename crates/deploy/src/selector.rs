//! Tag selection and dependency ordering.

use std::collections::{HashMap, VecDeque};

use crate::{Catalog, DeployError, DeploymentSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependency graph over the specs of a catalog, indexed by catalog position.
struct Graph<'a> {
    specs: &'a [DeploymentSpec],
    index: HashMap<&'a str, usize>,
}

impl<'a> Graph<'a> {
    fn new(specs: &'a [DeploymentSpec]) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.as_str(), i))
            .collect();
        Self { specs, index }
    }

    /// Dependencies of `node`, in catalog order.
    fn dependencies(&self, node: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.specs[node]
            .depends_on
            .iter()
            .filter_map(|name| self.index.get(name.as_str()).copied())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Topological order of the whole catalog, stable with respect to catalog order.
    fn topological_order(&self) -> Result<Vec<usize>, DeployError> {
        let mut marks = vec![None; self.specs.len()];
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.specs.len());

        for node in 0..self.specs.len() {
            self.visit(node, &mut marks, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Option<Mark>],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), DeployError> {
        match marks[node] {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|&n| n == node).unwrap_or_default();
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .map(|&n| self.specs[n].name.clone())
                    .collect();
                path.push(self.specs[node].name.clone());
                return Err(DeployError::Cycle(path));
            }
            None => {}
        }

        marks[node] = Some(Mark::Visiting);
        stack.push(node);
        for dep in self.dependencies(node) {
            self.visit(dep, marks, stack, order)?;
        }
        stack.pop();
        marks[node] = Some(Mark::Done);
        order.push(node);

        Ok(())
    }
}

/// Select the specs to process for `tags`, dependencies first.
///
/// An empty `tags` selects the whole catalog. Otherwise a spec is selected when it
/// carries at least one requested tag, and every transitive dependency of a selected
/// spec is selected too, even without a requested tag. Each such inclusion is logged.
///
/// Fails with [`DeployError::Cycle`] if the catalog's dependency graph has a cycle,
/// whatever the requested tags.
pub fn select<'a>(
    catalog: &'a Catalog,
    tags: &[String],
) -> Result<Vec<&'a DeploymentSpec>, DeployError> {
    let specs: &'a [DeploymentSpec] = catalog;
    let graph = Graph::new(specs);
    let order = graph.topological_order()?;

    for tag in tags {
        if !specs.iter().any(|spec| spec.tags.contains(tag)) {
            tracing::warn!(tag = %tag, "No deployment carries the requested tag");
        }
    }

    let mut selected = vec![false; specs.len()];
    let mut queue = VecDeque::new();
    for (i, spec) in specs.iter().enumerate() {
        if tags.is_empty() || tags.iter().any(|tag| spec.tags.contains(tag)) {
            selected[i] = true;
            queue.push_back(i);
        }
    }

    while let Some(node) = queue.pop_front() {
        for dep in graph.dependencies(node) {
            if !selected[dep] {
                tracing::info!(
                    dependency = %specs[dep].name,
                    required_by = %specs[node].name,
                    "Including dependency not matched by the requested tags"
                );
                selected[dep] = true;
                queue.push_back(dep);
            }
        }
    }

    let selection: Vec<&DeploymentSpec> = order
        .into_iter()
        .filter(|&i| selected[i])
        .map(|i| &specs[i])
        .collect();

    tracing::debug!(
        selected = ?selection.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
        "Selected deployments"
    );

    Ok(selection)
}

//! Depth-first topological ordering over an edge list
//!
//! The output lists every node after all of its dependencies (leaves first,
//! roots last). Reverse it for a top-down order.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

use tracing::trace;

use crate::edge::Edge;
use crate::error::{Result, XsdError};

/// What to do when the depth-first walk meets a node that is still open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Skip the back edge; the cycle is broken wherever traversal order lands
    Break,
    /// Fail with [`XsdError::DependencyCycle`]
    Fail,
}

/// Sorts the nodes of an edge list so dependencies precede dependents
#[derive(Debug, Clone, Copy)]
pub struct TopologicalSorter {
    policy: CyclePolicy,
}

impl Default for TopologicalSorter {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologicalSorter {
    pub fn new() -> Self {
        Self {
            policy: CyclePolicy::Break,
        }
    }

    pub fn with_policy(policy: CyclePolicy) -> Self {
        Self { policy }
    }

    /// Sort, silently breaking any cycle
    pub fn sort<T>(edges: &[Edge<T>]) -> Vec<T>
    where
        T: Clone + Eq + Hash + Display,
    {
        Self::new().run(edges).unwrap_or_default()
    }

    /// Sort, failing on the first back edge
    pub fn sort_strict<T>(edges: &[Edge<T>]) -> Result<Vec<T>>
    where
        T: Clone + Eq + Hash + Display,
    {
        Self::with_policy(CyclePolicy::Fail).run(edges)
    }

    /// Sort under this sorter's cycle policy. Edges with a missing end are ignored.
    pub fn run<T>(&self, edges: &[Edge<T>]) -> Result<Vec<T>>
    where
        T: Clone + Eq + Hash + Display,
    {
        let universe = node_universe(edges);

        let mut dependencies: HashMap<&T, Vec<&T>> = HashMap::with_capacity(universe.len());
        for (source, target) in edges.iter().filter_map(Edge::ends) {
            dependencies.entry(source).or_default().push(target);
        }

        let mut walk = Walk {
            dependencies: &dependencies,
            policy: self.policy,
            visited: HashSet::with_capacity(universe.len()),
            open: HashSet::new(),
            sorted: Vec::with_capacity(universe.len()),
        };

        for node in universe {
            walk.visit(node)?;
        }

        Ok(walk.sorted.into_iter().cloned().collect())
    }
}

/// Distinct endpoints: every source first, then every target, in first-seen order
pub fn node_universe<T: Eq + Hash>(edges: &[Edge<T>]) -> Vec<&T> {
    let mut seen = HashSet::new();
    let sources = edges.iter().filter_map(|e| e.ends().map(|(s, _)| s));
    let targets = edges.iter().filter_map(|e| e.ends().map(|(_, t)| t));
    sources.chain(targets).filter(|n| seen.insert(*n)).collect()
}

struct Walk<'a, T> {
    dependencies: &'a HashMap<&'a T, Vec<&'a T>>,
    policy: CyclePolicy,
    visited: HashSet<&'a T>,
    open: HashSet<&'a T>,
    sorted: Vec<&'a T>,
}

impl<'a, T> Walk<'a, T>
where
    T: Eq + Hash + Display,
{
    fn visit(&mut self, node: &'a T) -> Result<()> {
        if !self.visited.insert(node) {
            return Ok(());
        }
        self.open.insert(node);

        let dependencies = self.dependencies;
        if let Some(deps) = dependencies.get(node) {
            for &dep in deps {
                if self.open.contains(dep) {
                    match self.policy {
                        CyclePolicy::Break => {
                            trace!(from = %node, to = %dep, "breaking dependency cycle");
                            continue;
                        }
                        CyclePolicy::Fail => {
                            return Err(XsdError::DependencyCycle {
                                from: node.to_string(),
                                to: dep.to_string(),
                            });
                        }
                    }
                }
                self.visit(dep)?;
            }
        }

        self.open.remove(node);
        self.sorted.push(node);
        Ok(())
    }
}

//! Directed relation between two named schema nodes
//!
//! An edge doubles as the collector threaded through the dependency visitor:
//! while a declaration is being expanded only the source is known, and the
//! target is filled in on a clone at the point a dependency is found.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed edge `source -> target`. Either end may still be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Edge<T = String> {
    pub source: Option<T>,
    pub target: Option<T>,
}

impl<T> Edge<T> {
    /// A fully specified edge
    pub fn new(source: impl Into<T>, target: impl Into<T>) -> Self {
        Self {
            source: Some(source.into()),
            target: Some(target.into()),
        }
    }

    /// A partially filled edge whose dependencies are still being discovered
    pub fn rooted(source: impl Into<T>) -> Self {
        Self {
            source: Some(source.into()),
            target: None,
        }
    }

    /// Both ends, if the edge is complete
    pub fn ends(&self) -> Option<(&T, &T)> {
        match (&self.source, &self.target) {
            (Some(source), Some(target)) => Some((source, target)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.source.is_some() && self.target.is_some()
    }

    fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none()
    }
}

impl<T: Clone> Edge<T> {
    /// Clone of this edge pointing at `target`
    pub fn with_target(&self, target: impl Into<T>) -> Self {
        Self {
            source: self.source.clone(),
            target: Some(target.into()),
        }
    }
}

/// Two empty edges are equal; an edge with a single missing end equals nothing,
/// itself included.
impl<T: PartialEq> PartialEq for Edge<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.is_empty() && other.is_empty() {
            return true;
        }
        match (self.ends(), other.ends()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Edge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |end: &Option<T>| match end {
            Some(value) => value.to_string(),
            None => String::new(),
        };
        write!(f, "Source={}, Target={}", show(&self.source), show(&self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        let a: Edge = Edge::new("Root", "Child");
        let b: Edge = Edge::new("Root".to_string(), "Child".to_string());
        assert_eq!(a, b);
        assert_ne!(a, Edge::new("Root", "Other"));
        assert_ne!(a, Edge::new("Child", "Root"));
    }

    #[test]
    fn test_empty_edges_only_equal_each_other() {
        let empty: Edge = Edge::default();
        assert_eq!(empty, Edge::default());
        assert_ne!(empty, Edge::new("A", "B"));
        assert_ne!(Edge::new("A", "B"), empty);
    }

    #[test]
    fn test_partial_edges_never_equal() {
        let partial: Edge = Edge::rooted("A");
        assert_ne!(partial, Edge::rooted("A"));
        assert_ne!(partial, partial.clone());
        assert_ne!(partial, Edge::default());
    }

    #[test]
    fn test_with_target_leaves_collector_untouched() {
        let collector: Edge = Edge::rooted("EquityAsset");
        let edge = collector.with_target("ExchangeTraded");
        assert_eq!(edge, Edge::new("EquityAsset", "ExchangeTraded"));
        assert!(collector.target.is_none());
        assert!(!collector.is_complete());
    }

    #[test]
    fn test_display() {
        let edge: Edge = Edge::new("A", "B");
        assert_eq!(edge.to_string(), "Source=A, Target=B");
        assert_eq!(Edge::<String>::rooted("A").to_string(), "Source=A, Target=");
    }
}

//! Dependency Graph Extraction
//!
//! Walks every top-level element of a schema set and records which named
//! declarations depend on which: element references, element types, type
//! derivation, substitution groups and group use.

use chrono::Utc;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::{walk_content_model, walk_derivation, Extension, Node, SchemaVisitor};
use crate::edge::Edge;
use crate::error::{ReferenceKind, Result};
use crate::schema::{AttributeId, ContentType, ElementId, SchemaSet, TypeId};
use crate::topo::{node_universe, TopologicalSorter};

/// Collects dependency edges between named schema nodes.
///
/// Each element declaration is expanded at most once per run. A shared
/// declaration reached through several references contributes its edges once,
/// while every referencing site still records its own edge to it.
pub struct DependencyVisitor<'s> {
    schema: &'s SchemaSet,
    skip: HashSet<String>,
    edges: Vec<Edge>,
    processed: HashSet<ElementId>,
}

impl<'s> DependencyVisitor<'s> {
    pub fn new(schema: &'s SchemaSet) -> Self {
        Self {
            schema,
            skip: HashSet::new(),
            edges: Vec::new(),
            processed: HashSet::new(),
        }
    }

    /// Element names to leave out of the graph, descendants included
    pub fn with_skip<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(names.into_iter().map(Into::into));
        self
    }

    /// Traverse the whole schema set from a clean state
    pub fn run(&mut self) -> Result<DependencyGraph> {
        self.edges.clear();
        self.processed.clear();

        let schema = self.schema;
        for id in schema.top_level_elements() {
            self.visit(Node::Element(id), Edge::default())?;
        }
        for document in schema.documents() {
            for &id in &document.groups {
                self.visit(Node::Extension(Extension::Group(id)), Edge::default())?;
            }
        }

        debug!(
            edges = self.edges.len(),
            elements = self.processed.len(),
            "Collected dependency edges"
        );
        Ok(DependencyGraph::new(self.edges.clone()))
    }

    /// Edges collected by the last run
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

impl<'s> SchemaVisitor<'s> for DependencyVisitor<'s> {
    type Collector = Edge;

    fn schema(&self) -> &'s SchemaSet {
        self.schema
    }

    fn visit_element(&mut self, id: ElementId, mut collector: Edge) -> Result<()> {
        let schema = self.schema;
        let decl = schema.element(id);

        if self.skip.contains(decl.display_name()) {
            return Ok(());
        }
        if !self.processed.insert(id) {
            return Ok(());
        }

        if let Some(head_name) = &decl.substitution_group {
            let head = schema.require_element(head_name, ReferenceKind::SubstitutionGroup)?;
            let head_label = schema.element(head).display_name();
            self.edges.push(Edge::new(decl.display_name(), head_label));
            self.visit(Node::Element(head), Edge::rooted(head_label))?;
        }

        if let Some(reference) = &decl.ref_name {
            let target = schema.require_element(reference, ReferenceKind::Element)?;
            if collector.source.is_some() {
                self.edges.push(collector.with_target(reference.name.as_str()));
            }
            return self.visit(Node::Element(target), Edge::default());
        }

        let name = decl.display_name();
        collector.source = Some(name.to_string());

        if let Some(inline) = decl.inline_type {
            return self.visit(Node::for_type(schema, inline), Edge::rooted(name));
        }

        if let Some(type_id) = decl.resolved_type {
            match schema.type_def(type_id).name() {
                Some(type_name) => {
                    self.edges.push(collector.with_target(type_name));
                    self.visit(Node::for_type(schema, type_id), Edge::rooted(type_name))?;
                }
                None => self.visit(Node::for_type(schema, type_id), collector)?,
            }
        }
        Ok(())
    }

    fn visit_attribute(&mut self, _id: AttributeId, _collector: Edge) -> Result<()> {
        Ok(())
    }

    fn visit_complex_type(&mut self, id: TypeId, mut collector: Edge) -> Result<()> {
        let schema = self.schema;
        let Some(complex) = schema.complex_type(id) else {
            return Ok(());
        };

        if let (Some(base), Some(name)) = (complex.base, complex.name.as_deref()) {
            if let Some(source) = collector.source.as_deref().filter(|s| *s != name) {
                self.edges.push(Edge::new(source, name));
            }
            collector = Edge::rooted(name);
            self.visit(Node::for_type(schema, base), collector.clone())?;
        }

        if let Some(model) = &complex.content_model {
            self.visit(
                Node::Extension(Extension::for_content_model(model)),
                collector.clone(),
            )?;
        }

        let particle = match complex.content_type {
            ContentType::ElementOnly | ContentType::Mixed => complex.content_particle.as_ref(),
            ContentType::Empty | ContentType::TextOnly => complex.particle.as_ref(),
        };
        if let Some(particle) = particle {
            self.visit(Node::from_particle(particle), collector)?;
        }
        Ok(())
    }

    fn visit_extension(&mut self, extension: Extension<'s>, collector: Edge) -> Result<()> {
        let schema = self.schema;
        match extension {
            Extension::SimpleContent(_)
            | Extension::SimpleContentExtension(_)
            | Extension::SimpleContentRestriction(_) => Ok(()),
            Extension::ComplexContent(model) => walk_content_model(self, model, collector),
            Extension::ComplexContentExtension(derivation)
            | Extension::ComplexContentRestriction(derivation) => {
                walk_derivation(self, derivation, collector)
            }
            Extension::GroupRef(reference) => {
                let group = schema.require_group(&reference.name)?;
                if collector.source.is_some() {
                    self.edges
                        .push(collector.with_target(schema.group(group).name.as_str()));
                }
                Ok(())
            }
            Extension::Group(id) => {
                let group = schema.group(id);
                match &group.particle {
                    Some(particle) => self.visit(
                        Node::from_particle(particle),
                        Edge::rooted(group.name.as_str()),
                    ),
                    None => Ok(()),
                }
            }
        }
    }
}

// =============================================================================
// Derived views
// =============================================================================

/// The edges of one dependency run and the queries derived from them
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    /// Edges in discovery order, repeats included
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Distinct node names: sources first, then targets, in first-seen order
    pub fn nodes(&self) -> Vec<&str> {
        node_universe(&self.edges)
            .into_iter()
            .map(String::as_str)
            .collect()
    }

    /// Every node mapped to the distinct targets of its outgoing edges
    pub fn dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = self
            .nodes()
            .into_iter()
            .map(|n| (n.to_string(), BTreeSet::new()))
            .collect();
        for (source, target) in self.edges.iter().filter_map(Edge::ends) {
            map.entry(source.clone()).or_default().insert(target.clone());
        }
        map
    }

    /// Nodes nothing points at, in node order
    pub fn root_nodes(&self) -> Vec<&str> {
        let targets: HashSet<&str> = self
            .edges
            .iter()
            .filter_map(Edge::ends)
            .map(|(_, t)| t.as_str())
            .collect();
        self.nodes()
            .into_iter()
            .filter(|n| !targets.contains(n))
            .collect()
    }

    /// Topological order, roots first. Cycles are broken silently.
    pub fn sorted_dependencies(&self) -> Vec<String> {
        let mut sorted = TopologicalSorter::sort(&self.edges);
        sorted.reverse();
        sorted
    }

    /// Topological order, roots first, failing on the first cycle
    pub fn sorted_dependencies_strict(&self) -> Result<Vec<String>> {
        let mut sorted = TopologicalSorter::sort_strict(&self.edges)?;
        sorted.reverse();
        Ok(sorted)
    }

    fn to_petgraph(&self) -> (DiGraph<&str, ()>, HashMap<&str, NodeIndex>) {
        let nodes = self.nodes();
        let mut graph = DiGraph::with_capacity(nodes.len(), self.edges.len());
        let mut indices = HashMap::with_capacity(nodes.len());
        for node in nodes {
            indices.insert(node, graph.add_node(node));
        }
        for (source, target) in self.edges.iter().filter_map(Edge::ends) {
            if let (Some(&from), Some(&to)) = (indices.get(source.as_str()), indices.get(target.as_str())) {
                graph.add_edge(from, to, ());
            }
        }
        (graph, indices)
    }

    /// Strongly connected components with more than one member, plus self loops
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let (graph, _) = self.to_petgraph();
        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&idx| graph.contains_edge(idx, idx))
            })
            .map(|scc| {
                let mut names: Vec<String> = scc.iter().map(|&idx| graph[idx].to_string()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// One `source -> target` line per edge
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        for (source, target) in self.edges.iter().filter_map(Edge::ends) {
            output.push_str(&format!("{} -> {}\n", source, target));
        }
        output
    }

    /// GraphViz rendering; root nodes are highlighted
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph SchemaDependencies {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push('\n');

        let roots: HashSet<&str> = self.root_nodes().into_iter().collect();
        for node in self.nodes() {
            let color = if roots.contains(node) { "#FF9800" } else { "#E0E0E0" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                escape_dot(node),
                escape_dot(node),
                color
            ));
        }

        output.push('\n');

        let mut seen = HashSet::new();
        for (source, target) in self.edges.iter().filter_map(Edge::ends) {
            if seen.insert((source, target)) {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    escape_dot(source),
                    escape_dot(target)
                ));
            }
        }

        output.push_str("}\n");
        output
    }

    /// Summary of the graph for JSON output
    pub fn report(&self, bundle_hash: &str) -> GraphReport {
        GraphReport {
            generated_at: Utc::now().to_rfc3339(),
            bundle_hash: bundle_hash.to_string(),
            node_count: self.nodes().len(),
            edge_count: self.edges.len(),
            root_nodes: self.root_nodes().into_iter().map(str::to_string).collect(),
            sorted: self.sorted_dependencies(),
            cycles: self.cycles(),
            edges: self.edges.clone(),
        }
    }
}

fn escape_dot(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Serializable summary of a dependency run
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub generated_at: String,
    pub bundle_hash: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub root_nodes: Vec<String>,
    pub sorted: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(pairs: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::new(pairs.iter().map(|(s, t)| Edge::new(*s, *t)).collect())
    }

    #[test]
    fn test_root_nodes() {
        let g = graph(&[("C", "D"), ("B", "D"), ("A", "B"), ("B", "C")]);
        assert_eq!(g.root_nodes(), vec!["A"]);
        assert_eq!(g.nodes(), vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn test_dependencies_include_leaves() {
        let g = graph(&[("A", "B"), ("A", "B"), ("A", "C")]);
        let deps = g.dependencies();
        assert_eq!(deps["A"].len(), 2);
        assert!(deps["B"].is_empty());
    }

    #[test]
    fn test_sorted_dependencies_are_root_first() {
        let g = graph(&[("Root", "A"), ("A", "B"), ("B", "C")]);
        assert_eq!(g.sorted_dependencies(), vec!["Root", "A", "B", "C"]);
        assert_eq!(g.sorted_dependencies_strict().unwrap(), vec!["Root", "A", "B", "C"]);
    }

    #[test]
    fn test_cycles_found() {
        let g = graph(&[("A", "B"), ("B", "A"), ("B", "C"), ("D", "D")]);
        assert_eq!(
            g.cycles(),
            vec![vec!["A".to_string(), "B".to_string()], vec!["D".to_string()]]
        );
        assert!(g.sorted_dependencies_strict().is_err());
    }

    #[test]
    fn test_dot_output_deduplicates_edges() {
        let g = graph(&[("A", "B"), ("A", "B")]);
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph SchemaDependencies {"));
        assert_eq!(dot.matches("\"A\" -> \"B\"").count(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let g = graph(&[("A", "B")]);
        let json = serde_json::to_value(g.report("abc")).unwrap();
        assert_eq!(json["edge_count"], 1);
        assert_eq!(json["root_nodes"][0], "A");
        assert_eq!(json["edges"][0]["target"], "B");
    }
}

//! CSV export of XPath records
//!
//! ## Output
//!
//! ```text
//! Node,XPath,Annotation,Data Type,Optional,meta:column
//! /trade,/trade,"A trade",Trade,false,
//! trade/tradeId,/trade/tradeId,"Unique ""trade"" id",Token,false,TRADE_ID
//! trade@version,/trade@version,"",http://www.w3.org/2001/XMLSchema:int
//! ```
//!
//! Attribute rows carry four columns unless [`AttributeLayout::Unified`] is
//! selected, which appends the optional flag and extra columns so every row
//! matches the header.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

use crate::error::{ReferenceKind, Result, XsdError};
use crate::schema::{QName, RootDecl, SchemaSet};
use crate::visit::{DependencyGraph, DependencyVisitor, XPathEmitter};

/// Fixed leading columns of every export
pub const BASE_COLUMNS: [&str; 5] = ["Node", "XPath", "Annotation", "Data Type", "Optional"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    Element,
    Attribute,
}

/// One exported field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub kind: RecordKind,
    /// `parent/name` for elements, `owner@name` for attributes
    pub label: String,
    pub xpath: String,
    /// Annotation text as declared, unescaped
    pub annotation: String,
    pub data_type: String,
    pub optional: bool,
    /// Values of the requested extra attributes, empty when absent
    pub extras: Vec<String>,
}

impl Record {
    /// Annotation wrapped in quotes with embedded quotes doubled
    pub fn quoted_annotation(&self) -> String {
        format!("\"{}\"", self.annotation.replace('"', "\"\""))
    }

    pub fn to_csv(&self, layout: AttributeLayout) -> String {
        let mut fields = vec![
            self.label.clone(),
            self.xpath.clone(),
            self.quoted_annotation(),
            self.data_type.clone(),
        ];
        if self.kind == RecordKind::Element || layout == AttributeLayout::Unified {
            fields.push(self.optional.to_string());
            fields.extend(self.extras.iter().cloned());
        }
        fields.join(",")
    }
}

/// Column layout of attribute rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeLayout {
    /// Label, path, annotation and type only
    #[default]
    Compact,
    /// Same columns as element rows
    Unified,
}

/// Destination for emitted records
pub trait RecordSink {
    fn write_record(&mut self, record: &Record) -> Result<()>;
}

impl RecordSink for Vec<Record> {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes records as CSV lines
pub struct RecordWriter<W: Write> {
    writer: W,
    layout: AttributeLayout,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W, layout: AttributeLayout) -> Self {
        Self {
            writer,
            layout,
            written: 0,
        }
    }

    pub fn write_header(&mut self, extra_columns: &[String]) -> Result<()> {
        writeln!(self.writer, "{}", header(extra_columns))?;
        Ok(())
    }

    /// Records written so far, header excluded
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for RecordWriter<W> {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        writeln!(self.writer, "{}", record.to_csv(self.layout))?;
        self.written += 1;
        Ok(())
    }
}

/// Requested extra attributes as an ordered set, minus the base column names
pub fn extra_columns(requested: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if BASE_COLUMNS.contains(&name.as_str()) || columns.contains(name) {
            continue;
        }
        columns.push(name.clone());
    }
    columns
}

pub fn header(extra_columns: &[String]) -> String {
    BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extra_columns.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Roots
// =============================================================================

/// Look up a root by name. See [`SchemaSet::find_root`].
pub fn resolve_root(schema: &SchemaSet, name: &str) -> Result<RootDecl> {
    schema
        .find_root(name)
        .ok_or_else(|| XsdError::unresolved(ReferenceKind::Root, name))
}

/// First root node of the dependency graph that names a global element,
/// otherwise the first that names a global type
pub fn select_root(schema: &SchemaSet, graph: &DependencyGraph) -> Result<(String, RootDecl)> {
    let candidates = graph.root_nodes();
    debug!(candidates = candidates.len(), "Selecting root node");

    for name in &candidates {
        if let Some(root @ RootDecl::Element(_)) = schema.find_root(name) {
            return Ok((name.to_string(), root));
        }
    }
    for name in &candidates {
        let found = schema
            .target_namespaces()
            .into_iter()
            .find_map(|ns| schema.global_type(&QName::new(ns, *name)));
        if let Some(id) = found {
            return Ok((name.to_string(), RootDecl::Type(id)));
        }
    }
    Err(XsdError::NoRootNode)
}

/// Global element and type names closest to `query`, best first
pub fn suggest_roots(schema: &SchemaSet, query: &str, limit: usize) -> Vec<String> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, String)> = schema
        .global_names()
        .filter(|name| !name.is_xs())
        .filter_map(|name| {
            matcher
                .fuzzy_match(&name.name, query)
                .map(|score| (score, name.name.clone()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(limit).map(|(_, name)| name).collect()
}

/// Loaded documents as `(file name, target namespace)`, sorted by file name
pub fn loaded_schemas(schema: &SchemaSet) -> Vec<(String, String)> {
    let mut listing: Vec<(String, String)> = schema
        .documents()
        .iter()
        .map(|doc| {
            (
                doc.name.clone(),
                doc.target_namespace.clone().unwrap_or_default(),
            )
        })
        .collect();
    listing.sort();
    listing
}

// =============================================================================
// Driver
// =============================================================================

/// What to extract and how to lay it out
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Root element or `namespace:Type`; chosen from the dependency graph when absent
    pub root: Option<String>,
    pub skip: Vec<String>,
    pub extract: Vec<String>,
    pub attribute_layout: AttributeLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub root: String,
    pub records: usize,
}

/// Write the header and one row per field reachable from the root
pub fn extract_xpaths<W: Write>(
    schema: &SchemaSet,
    options: &ExportOptions,
    writer: W,
) -> Result<ExportSummary> {
    let (root_name, root) = match &options.root {
        Some(name) => (name.clone(), resolve_root(schema, name)?),
        None => {
            let graph = DependencyVisitor::new(schema).run()?;
            let selected = select_root(schema, &graph)?;
            info!(root = %selected.0, "Selected root node");
            selected
        }
    };

    let columns = extra_columns(&options.extract);
    let mut out = RecordWriter::new(writer, options.attribute_layout);
    out.write_header(&columns)?;

    XPathEmitter::new(schema, &mut out)
        .with_skip(options.skip.iter().cloned())
        .with_extract(columns)
        .emit_from(root)?;

    let records = out.written();
    out.into_inner()?;
    info!(root = %root_name, records, "Extracted XPaths");

    Ok(ExportSummary {
        root: root_name,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(annotation: &str) -> Record {
        Record {
            kind: RecordKind::Element,
            label: "trade/party".into(),
            xpath: "/trade/party".into(),
            annotation: annotation.into(),
            data_type: "Party".into(),
            optional: true,
            extras: vec!["P1".into(), String::new()],
        }
    }

    #[test]
    fn test_quotes_doubled() {
        let record = element(r#"The "buyer" party"#);
        assert_eq!(record.quoted_annotation(), r#""The ""buyer"" party""#);
    }

    #[test]
    fn test_element_row() {
        assert_eq!(
            element("").to_csv(AttributeLayout::Compact),
            r#"trade/party,/trade/party,"",Party,true,P1,"#
        );
    }

    #[test]
    fn test_attribute_row_layouts() {
        let record = Record {
            kind: RecordKind::Attribute,
            label: "party@id".into(),
            xpath: "/trade/party@id".into(),
            annotation: String::new(),
            data_type: "http://www.w3.org/2001/XMLSchema:ID".into(),
            optional: false,
            extras: vec![String::new()],
        };
        assert_eq!(
            record.to_csv(AttributeLayout::Compact),
            r#"party@id,/trade/party@id,"",http://www.w3.org/2001/XMLSchema:ID"#
        );
        assert_eq!(
            record.to_csv(AttributeLayout::Unified),
            r#"party@id,/trade/party@id,"",http://www.w3.org/2001/XMLSchema:ID,false,"#
        );
    }

    #[test]
    fn test_extra_columns_form_ordered_set() {
        let requested = vec![
            "meta:column".to_string(),
            "Optional".to_string(),
            "meta:length".to_string(),
            "meta:column".to_string(),
        ];
        let columns = extra_columns(&requested);
        assert_eq!(columns, vec!["meta:column", "meta:length"]);
        assert_eq!(
            header(&columns),
            "Node,XPath,Annotation,Data Type,Optional,meta:column,meta:length"
        );
    }

    #[test]
    fn test_writer_counts_records() {
        let mut writer = RecordWriter::new(Vec::new(), AttributeLayout::Compact);
        writer.write_header(&[]).unwrap();
        writer.write_record(&element("x")).unwrap();
        assert_eq!(writer.written(), 1);
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_layout_deserializes_lowercase() {
        let layout: AttributeLayout = serde_json::from_str("\"unified\"").unwrap();
        assert_eq!(layout, AttributeLayout::Unified);
    }
}

//! XPath extraction
//!
//! Walks from a single root declaration and reports every element that has a
//! named or built-in type, and every attribute use, together with its path
//! from the root.

use std::collections::HashSet;
use tracing::trace;

use super::{Extension, Node, SchemaVisitor};
use crate::error::{Result, XsdError};
use crate::export::{Record, RecordKind, RecordSink};
use crate::schema::{
    AttributeId, AttributeUse, ContentType, ElementId, RootDecl, SchemaSet, TypeId,
};

/// Element names from the root to the current position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathStack(Vec<String>);

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// This path extended by one segment
    pub fn pushed(&self, name: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|segment| segment == name)
    }

    /// Innermost segment
    pub fn current(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Segment below the innermost one
    pub fn parent(&self) -> Option<&str> {
        self.0.len().checked_sub(2).map(|i| self.0[i].as_str())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Root-first, slash-separated: `/a/b/c`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            out.push('/');
            out.push_str(segment);
        }
        out
    }

    /// Like [`render`](Self::render), but `/` for the empty path
    pub fn render_owner(&self) -> String {
        if self.0.is_empty() {
            "/".to_string()
        } else {
            self.render()
        }
    }
}

/// Emits one [`Record`] per reachable field.
///
/// An element whose name is already on the current path is not entered again,
/// which ends recursion through self-referencing types while still allowing
/// the same declaration on independent branches.
pub struct XPathEmitter<'s, 'w> {
    schema: &'s SchemaSet,
    skip: HashSet<String>,
    extract: Vec<String>,
    sink: &'w mut dyn RecordSink,
}

impl<'s, 'w> XPathEmitter<'s, 'w> {
    pub fn new(schema: &'s SchemaSet, sink: &'w mut dyn RecordSink) -> Self {
        Self {
            schema,
            skip: HashSet::new(),
            extract: Vec::new(),
            sink,
        }
    }

    /// Element and attribute names to leave out, descendants included
    pub fn with_skip<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(names.into_iter().map(Into::into));
        self
    }

    /// Extra attributes copied from each declaration, in column order
    pub fn with_extract(mut self, names: Vec<String>) -> Self {
        self.extract = names;
        self
    }

    /// Walk from `root` with an empty path
    pub fn emit_from(&mut self, root: RootDecl) -> Result<()> {
        let schema = self.schema;
        match root {
            RootDecl::Element(id) => self.visit(Node::Element(id), PathStack::new()),
            RootDecl::Type(id) => self.visit(Node::for_type(schema, id), PathStack::new()),
        }
    }

    fn extras(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        self.extract
            .iter()
            .map(|name| lookup(name).unwrap_or_default())
            .collect()
    }
}

impl<'s, 'w> SchemaVisitor<'s> for XPathEmitter<'s, 'w> {
    type Collector = PathStack;

    fn schema(&self) -> &'s SchemaSet {
        self.schema
    }

    fn visit_element(&mut self, id: ElementId, path: PathStack) -> Result<()> {
        let schema = self.schema;
        let site = schema.element(id);
        let target = schema.resolve_element(id)?;
        let name = site.display_name();

        if self.skip.contains(name) {
            return Ok(());
        }
        if path.contains(name) {
            trace!(element = name, path = %path.render(), "Skipping self reference");
            return Ok(());
        }

        let path = path.pushed(name);
        let decl = schema.element(target);

        if let Some(inline) = decl.inline_type {
            return self.visit(Node::for_type(schema, inline), path);
        }
        let Some(type_id) = decl.resolved_type else {
            return Ok(());
        };

        let record = Record {
            kind: RecordKind::Element,
            label: format!("{}/{}", path.parent().unwrap_or(""), decl.display_name()),
            xpath: path.render(),
            annotation: decl.annotation.text(),
            data_type: schema.type_def(type_id).value_type_name(),
            optional: site.occurs.is_optional(),
            extras: self.extras(|n| decl.extra_attribute(n).map(str::to_string)),
        };
        self.sink.write_record(&record)?;

        self.visit(Node::for_type(schema, type_id), path)
    }

    fn visit_attribute(&mut self, id: AttributeId, path: PathStack) -> Result<()> {
        let schema = self.schema;
        let name = schema.attribute(id).display_name();
        if self.skip.contains(name) {
            return Ok(());
        }

        let decl = schema.attribute(schema.resolve_attribute(id)?);
        let owner = path.current().unwrap_or("");
        let record = Record {
            kind: RecordKind::Attribute,
            label: format!("{}@{}", owner, name),
            xpath: format!("{}@{}", path.render_owner(), name),
            annotation: decl.annotation.text(),
            data_type: decl
                .type_name
                .as_ref()
                .map(|q| q.to_string())
                .unwrap_or_default(),
            optional: schema.attribute(id).use_ != AttributeUse::Required,
            extras: self.extras(|n| decl.extra_attribute(n).map(str::to_string)),
        };
        self.sink.write_record(&record)
    }

    fn visit_complex_type(&mut self, id: TypeId, path: PathStack) -> Result<()> {
        let schema = self.schema;
        let Some(complex) = schema.complex_type(id) else {
            return Ok(());
        };
        for &attribute in &complex.attribute_uses {
            self.visit(Node::Attribute(attribute), path.clone())?;
        }

        // A derived mixed type has no declared particle of its own
        let particle = match complex.content_type {
            ContentType::ElementOnly | ContentType::Mixed => complex.content_particle.as_ref(),
            ContentType::Empty | ContentType::TextOnly => complex.particle.as_ref(),
        };
        match particle {
            Some(particle) => self.visit(Node::from_particle(particle), path),
            None => Ok(()),
        }
    }

    fn visit_extension(&mut self, extension: Extension<'s>, path: PathStack) -> Result<()> {
        let schema = self.schema;
        match extension {
            Extension::GroupRef(reference) => {
                let group = schema.group(schema.require_group(&reference.name)?);
                match &group.compiled {
                    Some(particle) => self.visit(Node::from_particle(particle), path),
                    None => Ok(()),
                }
            }
            other => Err(XsdError::UnsupportedNodeKind(other.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::QName;

    #[test]
    fn test_path_stack() {
        let root = PathStack::new();
        assert_eq!(root.render(), "");
        assert_eq!(root.parent(), None);

        let path = root.pushed("trade").pushed("party");
        assert_eq!(path.render(), "/trade/party");
        assert_eq!(path.current(), Some("party"));
        assert_eq!(path.parent(), Some("trade"));
        assert!(path.contains("trade"));
        assert_eq!(root.depth(), 0);
        assert_eq!(path.depth(), 2);
        assert_eq!(root.render_owner(), "/");
        assert_eq!(path.render_owner(), "/trade/party");
    }

    const RECURSIVE: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="node" type="Node"/>
  <xs:complexType name="Node">
    <xs:sequence>
      <xs:element name="label" type="xs:string"/>
      <xs:element ref="node" minOccurs="0" maxOccurs="unbounded"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;

    #[test]
    fn test_self_reference_terminates_with_one_record_per_name() {
        let schema = SchemaSet::parse_str("tree.xsd", RECURSIVE).unwrap();
        let root = schema.find_root("node").unwrap();
        let mut records: Vec<Record> = Vec::new();
        XPathEmitter::new(&schema, &mut records).emit_from(root).unwrap();

        let paths: Vec<&str> = records.iter().map(|r| r.xpath.as_str()).collect();
        assert_eq!(paths, vec!["/node", "/node/label"]);
    }

    #[test]
    fn test_group_ref_in_mixed_type_is_expanded() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType mixed="true">
      <xs:group ref="Inline"/>
    </xs:complexType>
  </xs:element>
  <xs:group name="Inline">
    <xs:choice><xs:element name="em" type="xs:string"/></xs:choice>
  </xs:group>
</xs:schema>"#;
        let schema = SchemaSet::parse_str("note.xsd", xsd).unwrap();
        let note = schema.global_element(&QName::local("note")).unwrap();
        let mut records: Vec<Record> = Vec::new();
        XPathEmitter::new(&schema, &mut records)
            .emit_from(RootDecl::Element(note))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "note/em");
        assert_eq!(records[0].xpath, "/note/em");
    }

    #[test]
    fn test_mixed_extension_keeps_inherited_and_own_fields() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="m" type="M"/>
  <xs:complexType name="B">
    <xs:sequence><xs:element name="x" type="xs:string"/></xs:sequence>
  </xs:complexType>
  <xs:complexType name="M" mixed="true">
    <xs:complexContent>
      <xs:extension base="B">
        <xs:sequence><xs:element name="y" type="xs:string"/></xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#;
        let schema = SchemaSet::parse_str("mixed.xsd", xsd).unwrap();
        let root = schema.find_root("m").unwrap();
        let mut records: Vec<Record> = Vec::new();
        XPathEmitter::new(&schema, &mut records).emit_from(root).unwrap();

        let paths: Vec<&str> = records.iter().map(|r| r.xpath.as_str()).collect();
        assert_eq!(paths, vec!["/m", "/m/x", "/m/y"]);
    }

    #[test]
    fn test_mixed_type_over_empty_group_is_text_only() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType mixed="true">
      <xs:group ref="Nothing"/>
    </xs:complexType>
  </xs:element>
  <xs:group name="Nothing"><xs:sequence/></xs:group>
</xs:schema>"#;
        let schema = SchemaSet::parse_str("note.xsd", xsd).unwrap();
        let note = schema.global_element(&QName::local("note")).unwrap();
        let mut records: Vec<Record> = Vec::new();
        XPathEmitter::new(&schema, &mut records)
            .emit_from(RootDecl::Element(note))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_type_root_attributes_hang_off_slash() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Party">
    <xs:sequence><xs:element name="name" type="xs:string"/></xs:sequence>
    <xs:attribute name="id" type="xs:ID"/>
  </xs:complexType>
</xs:schema>"#;
        let schema = SchemaSet::parse_str("party.xsd", xsd).unwrap();
        let party = schema.global_type(&QName::local("Party")).unwrap();
        let mut records: Vec<Record> = Vec::new();
        XPathEmitter::new(&schema, &mut records)
            .emit_from(RootDecl::Type(party))
            .unwrap();

        assert_eq!(records[0].label, "@id");
        assert_eq!(records[0].xpath, "/@id");
        assert_eq!(records[1].xpath, "/name");
    }
}

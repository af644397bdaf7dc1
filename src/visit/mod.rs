//! Visitor dispatch over compiled schema nodes
//!
//! [`Node`] is the closed set of kinds every visitor handles. Kinds that only
//! some visitors care about (content model wrappers, group references and
//! group bodies) travel inside [`Node::Extension`]; a visitor that does not
//! override [`SchemaVisitor::visit_extension`] fails with
//! [`XsdError::UnsupportedNodeKind`] when it meets one.
//!
//! Default handlers live in the `walk_*` functions so that an override can
//! still run the structural recursion it replaces.

pub mod dependencies;
pub mod xpath;

pub use dependencies::{DependencyGraph, DependencyVisitor, GraphReport};
pub use xpath::{PathStack, XPathEmitter};

use crate::error::{Result, XsdError};
use crate::schema::{
    AttributeId, ContentModel, ContentModelKind, ContentType, Derivation, DerivationMethod,
    ElementId, GroupId, GroupRef, ModelGroup, Particle, SchemaSet, TypeDef, TypeId, Wildcard,
};

/// A schema node reachable during traversal
#[derive(Debug, Clone, Copy)]
pub enum Node<'s> {
    Element(ElementId),
    Attribute(AttributeId),
    SimpleType(TypeId),
    ComplexType(TypeId),
    Sequence(&'s ModelGroup),
    Choice(&'s ModelGroup),
    Any(&'s Wildcard),
    Extension(Extension<'s>),
}

/// Node kinds outside the core set
#[derive(Debug, Clone, Copy)]
pub enum Extension<'s> {
    SimpleContent(&'s ContentModel),
    ComplexContent(&'s ContentModel),
    SimpleContentExtension(&'s Derivation),
    ComplexContentExtension(&'s Derivation),
    SimpleContentRestriction(&'s Derivation),
    ComplexContentRestriction(&'s Derivation),
    GroupRef(&'s GroupRef),
    Group(GroupId),
}

impl<'s> Node<'s> {
    pub fn from_particle(particle: &'s Particle) -> Self {
        match particle {
            Particle::Element(id) => Node::Element(*id),
            Particle::Sequence(group) => Node::Sequence(group),
            Particle::Choice(group) => Node::Choice(group),
            Particle::Any(wildcard) => Node::Any(wildcard),
            Particle::GroupRef(reference) => Node::Extension(Extension::GroupRef(reference)),
        }
    }

    pub fn for_type(schema: &SchemaSet, id: TypeId) -> Self {
        match schema.type_def(id) {
            TypeDef::Simple(_) => Node::SimpleType(id),
            TypeDef::Complex(_) => Node::ComplexType(id),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Element(_) => "element",
            Node::Attribute(_) => "attribute",
            Node::SimpleType(_) => "simple type",
            Node::ComplexType(_) => "complex type",
            Node::Sequence(_) => "sequence",
            Node::Choice(_) => "choice",
            Node::Any(_) => "any",
            Node::Extension(extension) => extension.kind_name(),
        }
    }
}

impl<'s> Extension<'s> {
    pub fn for_content_model(model: &'s ContentModel) -> Self {
        match model.kind {
            ContentModelKind::Simple => Extension::SimpleContent(model),
            ContentModelKind::Complex => Extension::ComplexContent(model),
        }
    }

    /// The extension or restriction node inside a content model
    pub fn for_derivation(model: &'s ContentModel) -> Self {
        let derivation = &model.derivation;
        match (model.kind, derivation.method) {
            (ContentModelKind::Simple, DerivationMethod::Extension) => {
                Extension::SimpleContentExtension(derivation)
            }
            (ContentModelKind::Simple, DerivationMethod::Restriction) => {
                Extension::SimpleContentRestriction(derivation)
            }
            (ContentModelKind::Complex, DerivationMethod::Extension) => {
                Extension::ComplexContentExtension(derivation)
            }
            (ContentModelKind::Complex, DerivationMethod::Restriction) => {
                Extension::ComplexContentRestriction(derivation)
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Extension::SimpleContent(_) => "simple content",
            Extension::ComplexContent(_) => "complex content",
            Extension::SimpleContentExtension(_) => "simple content extension",
            Extension::ComplexContentExtension(_) => "complex content extension",
            Extension::SimpleContentRestriction(_) => "simple content restriction",
            Extension::ComplexContentRestriction(_) => "complex content restriction",
            Extension::GroupRef(_) => "group reference",
            Extension::Group(_) => "group",
        }
    }
}

// =============================================================================
// Visitor trait
// =============================================================================

/// A traversal over a compiled [`SchemaSet`], threading a collector value
/// through the recursion.
///
/// The collector is passed by value. Handlers that branch hand each branch
/// its own clone, so no branch observes another's changes.
pub trait SchemaVisitor<'s> {
    type Collector: Clone;

    fn schema(&self) -> &'s SchemaSet;

    /// Route a node to its handler
    fn visit(&mut self, node: Node<'s>, collector: Self::Collector) -> Result<()> {
        dispatch(self, node, collector)
    }

    fn visit_element(&mut self, id: ElementId, collector: Self::Collector) -> Result<()>;

    fn visit_attribute(&mut self, id: AttributeId, collector: Self::Collector) -> Result<()>;

    fn visit_simple_type(&mut self, _id: TypeId, _collector: Self::Collector) -> Result<()> {
        Ok(())
    }

    fn visit_complex_type(&mut self, id: TypeId, collector: Self::Collector) -> Result<()> {
        walk_complex_type(self, id, collector)
    }

    fn visit_sequence(&mut self, group: &'s ModelGroup, collector: Self::Collector) -> Result<()> {
        walk_model_group(self, group, collector)
    }

    fn visit_choice(&mut self, group: &'s ModelGroup, collector: Self::Collector) -> Result<()> {
        walk_model_group(self, group, collector)
    }

    fn visit_any(&mut self, _wildcard: &'s Wildcard, _collector: Self::Collector) -> Result<()> {
        Ok(())
    }

    fn visit_extension(
        &mut self,
        extension: Extension<'s>,
        _collector: Self::Collector,
    ) -> Result<()> {
        Err(XsdError::UnsupportedNodeKind(extension.kind_name()))
    }
}

/// Route a node to the matching handler on `visitor`
pub fn dispatch<'s, V>(visitor: &mut V, node: Node<'s>, collector: V::Collector) -> Result<()>
where
    V: SchemaVisitor<'s> + ?Sized,
{
    match node {
        Node::Element(id) => visitor.visit_element(id, collector),
        Node::Attribute(id) => visitor.visit_attribute(id, collector),
        Node::SimpleType(id) => visitor.visit_simple_type(id, collector),
        Node::ComplexType(id) => visitor.visit_complex_type(id, collector),
        Node::Sequence(group) => visitor.visit_sequence(group, collector),
        Node::Choice(group) => visitor.visit_choice(group, collector),
        Node::Any(wildcard) => visitor.visit_any(wildcard, collector),
        Node::Extension(extension) => visitor.visit_extension(extension, collector),
    }
}

// =============================================================================
// Default structural recursion
// =============================================================================

/// Visit the compiled content of an element-only type, otherwise its
/// declared particle
pub fn walk_complex_type<'s, V>(visitor: &mut V, id: TypeId, collector: V::Collector) -> Result<()>
where
    V: SchemaVisitor<'s> + ?Sized,
{
    let schema = visitor.schema();
    let Some(complex) = schema.complex_type(id) else {
        return Ok(());
    };

    let particle = if complex.content_type == ContentType::ElementOnly {
        complex.content_particle.as_ref()
    } else {
        complex.particle.as_ref()
    };
    match particle {
        Some(particle) => visitor.visit(Node::from_particle(particle), collector),
        None => Ok(()),
    }
}

/// Visit each item of a sequence or choice in document order
pub fn walk_model_group<'s, V>(
    visitor: &mut V,
    group: &'s ModelGroup,
    collector: V::Collector,
) -> Result<()>
where
    V: SchemaVisitor<'s> + ?Sized,
{
    for item in &group.items {
        visitor.visit(Node::from_particle(item), collector.clone())?;
    }
    Ok(())
}

/// Visit the extension or restriction inside a content model
pub fn walk_content_model<'s, V>(
    visitor: &mut V,
    model: &'s ContentModel,
    collector: V::Collector,
) -> Result<()>
where
    V: SchemaVisitor<'s> + ?Sized,
{
    visitor.visit(Node::Extension(Extension::for_derivation(model)), collector)
}

/// Visit the particle of an extension or restriction, if any
pub fn walk_derivation<'s, V>(
    visitor: &mut V,
    derivation: &'s Derivation,
    collector: V::Collector,
) -> Result<()>
where
    V: SchemaVisitor<'s> + ?Sized,
{
    match &derivation.particle {
        Some(particle) => visitor.visit(Node::from_particle(particle), collector),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::QName;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="id" type="xs:string"/>
        <xs:choice>
          <xs:element name="email" type="xs:string"/>
          <xs:element name="phone" type="xs:string"/>
        </xs:choice>
        <xs:group ref="Audit"/>
        <xs:any minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:group name="Audit">
    <xs:sequence><xs:element name="createdBy" type="xs:string"/></xs:sequence>
  </xs:group>
</xs:schema>"#;

    /// Records element names in visit order with the default handlers
    struct NameCollector<'s> {
        schema: &'s SchemaSet,
        names: Vec<String>,
    }

    impl<'s> SchemaVisitor<'s> for NameCollector<'s> {
        type Collector = usize;

        fn schema(&self) -> &'s SchemaSet {
            self.schema
        }

        fn visit_element(&mut self, id: ElementId, depth: usize) -> Result<()> {
            let decl = self.schema.element(id);
            self.names.push(format!("{}:{}", depth, decl.display_name()));
            match decl.resolved_type {
                Some(ty) => self.visit(Node::for_type(self.schema, ty), depth + 1),
                None => Ok(()),
            }
        }

        fn visit_attribute(&mut self, _id: AttributeId, _depth: usize) -> Result<()> {
            Ok(())
        }
    }

    fn order(schema: &SchemaSet) -> ElementId {
        schema.global_element(&QName::local("order")).unwrap()
    }

    #[test]
    fn test_default_walk_uses_compiled_content_in_document_order() {
        let schema = SchemaSet::parse_str("order.xsd", SCHEMA).unwrap();
        let mut visitor = NameCollector {
            schema: &schema,
            names: Vec::new(),
        };
        visitor.visit(Node::Element(order(&schema)), 0).unwrap();
        assert_eq!(
            visitor.names,
            vec!["0:order", "1:id", "1:email", "1:phone", "1:createdBy"]
        );
    }

    #[test]
    fn test_unhandled_extension_fails() {
        let schema = SchemaSet::parse_str("order.xsd", SCHEMA).unwrap();
        let mut visitor = NameCollector {
            schema: &schema,
            names: Vec::new(),
        };
        let group = schema.global_group(&QName::local("Audit")).unwrap();
        let err = visitor
            .visit(Node::Extension(Extension::Group(group)), 0)
            .unwrap_err();
        assert!(matches!(err, XsdError::UnsupportedNodeKind("group")));
    }

    #[test]
    fn test_kind_names() {
        let wildcard = Wildcard::default();
        assert_eq!(Node::Any(&wildcard).kind_name(), "any");
        let reference = GroupRef {
            name: QName::local("Audit"),
            occurs: Default::default(),
        };
        assert_eq!(
            Node::from_particle(&Particle::GroupRef(reference.clone())).kind_name(),
            "group reference"
        );
    }
}

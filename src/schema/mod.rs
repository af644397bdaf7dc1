//! Compiled XML Schema model
//!
//! Declarations live in arenas owned by [`SchemaSet`] and are addressed by
//! small copyable ids. Two references denote the same declaration exactly when
//! their ids are equal, which is what the dependency visitor's processed-set
//! relies on.
//!
//! Global declarations are also indexed by qualified name. Element references
//! and substitution groups stay as names and are resolved at traversal time;
//! type names, base types and group references are resolved when the set is
//! compiled by the [`loader`].

pub mod builtins;
pub mod loader;

pub use loader::{LoadConfig, SchemaLoader};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ReferenceKind, Result, XsdError};

/// The XML Schema namespace
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

// =============================================================================
// Names and ids
// =============================================================================

/// Namespace-qualified name. Displays as `namespace:name`, or just `name`
/// when there is no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub namespace: Option<String>,
    pub name: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    /// A name in no namespace
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// A name in the XML Schema namespace
    pub fn xs(name: impl Into<String>) -> Self {
        Self::new(Some(XS_NS), name)
    }

    /// Split `namespace:name` at the last colon
    pub fn parse_qualified(qualified: &str) -> Self {
        match qualified.rsplit_once(':') {
            Some((namespace, name)) => Self::new(Some(namespace), name),
            None => Self::local(qualified),
        }
    }

    pub fn is_xs(&self) -> bool {
        self.namespace.as_deref() == Some(XS_NS)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}:{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Identity of one element declaration or element particle
    ElementId
);
arena_id!(
    /// Identity of a simple or complex type definition
    TypeId
);
arena_id!(
    /// Identity of an attribute declaration
    AttributeId
);
arena_id!(
    /// Identity of a named model group
    GroupId
);
arena_id!(
    /// Identity of a named attribute group
    AttributeGroupId
);

// =============================================================================
// Occurrence and annotation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxOccurs {
    Bounded(u64),
    Unbounded,
}

impl Default for MaxOccurs {
    fn default() -> Self {
        MaxOccurs::Bounded(1)
    }
}

/// `minOccurs`/`maxOccurs` on a particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurs {
    pub min: u64,
    pub max: MaxOccurs,
}

impl Default for Occurs {
    fn default() -> Self {
        Self {
            min: 1,
            max: MaxOccurs::Bounded(1),
        }
    }
}

impl Occurs {
    pub fn is_optional(&self) -> bool {
        self.min == 0
    }
}

/// Text collected from `xs:documentation` and `xs:appinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub fragments: Vec<String>,
}

impl Annotation {
    /// All fragments joined with single spaces
    pub fn text(&self) -> String {
        self.fragments.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// An element declaration, a local element, or an element reference
#[derive(Debug, Clone, Default)]
pub struct ElementDecl {
    /// Local name; `None` for references
    pub name: Option<String>,
    pub namespace: Option<String>,
    /// Target of `ref="..."`
    pub ref_name: Option<QName>,
    /// Value of `type="..."`
    pub type_name: Option<QName>,
    /// Anonymous type declared inside the element
    pub inline_type: Option<TypeId>,
    /// The element's type after compilation (inline, named, inherited from the
    /// substitution head, or `anyType`). `None` for references.
    pub resolved_type: Option<TypeId>,
    pub substitution_group: Option<QName>,
    pub occurs: Occurs,
    pub is_global: bool,
    pub is_abstract: bool,
    pub annotation: Annotation,
    /// Attributes from foreign namespaces, keyed by their prefixed name as written
    pub extra_attributes: Vec<(String, String)>,
}

impl ElementDecl {
    /// Name used for paths and edges: the local name, or the referenced name
    pub fn display_name(&self) -> &str {
        match (&self.name, &self.ref_name) {
            (Some(name), _) => name,
            (None, Some(reference)) => &reference.name,
            (None, None) => "",
        }
    }

    pub fn qualified_name(&self) -> Option<QName> {
        self.name
            .as_ref()
            .map(|name| QName::new(self.namespace.as_deref(), name.clone()))
    }

    pub fn is_reference(&self) -> bool {
        self.ref_name.is_some()
    }

    pub fn extra_attribute(&self, name: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttributeUse {
    #[default]
    Optional,
    Required,
    Prohibited,
}

/// An attribute declaration or attribute reference
#[derive(Debug, Clone, Default)]
pub struct AttributeDecl {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub ref_name: Option<QName>,
    pub type_name: Option<QName>,
    pub inline_type: Option<TypeId>,
    pub use_: AttributeUse,
    pub is_global: bool,
    pub annotation: Annotation,
    pub extra_attributes: Vec<(String, String)>,
}

impl AttributeDecl {
    pub fn display_name(&self) -> &str {
        match (&self.name, &self.ref_name) {
            (Some(name), _) => name,
            (None, Some(reference)) => &reference.name,
            (None, None) => "",
        }
    }

    pub fn extra_attribute(&self, name: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A named `xs:group`
#[derive(Debug, Clone, Default)]
pub struct GroupDef {
    pub name: String,
    pub namespace: Option<String>,
    pub particle: Option<Particle>,
    /// The particle with nested group references inlined
    pub compiled: Option<Particle>,
    pub annotation: Annotation,
}

impl GroupDef {
    pub fn qualified_name(&self) -> QName {
        QName::new(self.namespace.as_deref(), self.name.clone())
    }
}

/// A named `xs:attributeGroup`
#[derive(Debug, Clone, Default)]
pub struct AttributeGroupDef {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<AttributeId>,
    pub group_refs: Vec<QName>,
}

// =============================================================================
// Content structure
// =============================================================================

/// A content particle
#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    Element(ElementId),
    /// `xs:sequence`; `xs:all` is folded into this
    Sequence(ModelGroup),
    Choice(ModelGroup),
    Any(Wildcard),
    GroupRef(GroupRef),
}

impl Particle {
    /// True when no element or wildcard can appear anywhere inside
    pub fn is_empty(&self) -> bool {
        match self {
            Particle::Element(_) | Particle::Any(_) => false,
            Particle::Sequence(group) | Particle::Choice(group) => {
                group.items.iter().all(Particle::is_empty)
            }
            Particle::GroupRef(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelGroup {
    pub items: Vec<Particle>,
    pub occurs: Occurs,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wildcard {
    pub namespace: Option<String>,
    pub process_contents: Option<String>,
    pub occurs: Occurs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRef {
    pub name: QName,
    pub occurs: Occurs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentModelKind {
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationMethod {
    Extension,
    Restriction,
}

/// The `extension` or `restriction` inside a content model
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub method: DerivationMethod,
    pub base_name: QName,
    pub particle: Option<Particle>,
}

/// `xs:simpleContent` or `xs:complexContent`
#[derive(Debug, Clone, PartialEq)]
pub struct ContentModel {
    pub kind: ContentModelKind,
    pub derivation: Derivation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Empty,
    TextOnly,
    ElementOnly,
    Mixed,
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimpleVariety {
    #[default]
    Atomic,
    List,
    Union,
}

#[derive(Debug, Clone, Default)]
pub struct SimpleType {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub base_name: Option<QName>,
    pub base: Option<TypeId>,
    pub variety: SimpleVariety,
    /// Built-in type code; inherited from the base for atomic restrictions
    pub type_code: Option<&'static str>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Default)]
pub struct ComplexType {
    pub name: Option<String>,
    pub namespace: Option<String>,
    /// `anyType` for types without an explicit derivation; `None` only for
    /// `anyType` itself
    pub base: Option<TypeId>,
    pub content_model: Option<ContentModel>,
    /// Particle declared directly in the type (not inside a content model)
    pub particle: Option<Particle>,
    pub attributes: Vec<AttributeId>,
    pub attribute_group_refs: Vec<QName>,
    pub mixed: bool,
    pub is_abstract: bool,
    pub annotation: Annotation,
    /// Computed by the compiler
    pub content_type: ContentType,
    /// Type code of the simple value for simple content; `Item` for `anyType`
    pub type_code: Option<&'static str>,
    /// Effective particle: base content followed by own content for
    /// extensions, with group references inlined
    pub content_particle: Option<Particle>,
    /// Own attributes plus inherited ones, attribute groups flattened
    pub attribute_uses: Vec<AttributeId>,
}

impl ComplexType {
    pub fn derivation(&self) -> Option<&Derivation> {
        self.content_model.as_ref().map(|model| &model.derivation)
    }
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

impl TypeDef {
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDef::Simple(simple) => simple.name.as_deref(),
            TypeDef::Complex(complex) => complex.name.as_deref(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            TypeDef::Simple(simple) => simple.namespace.as_deref(),
            TypeDef::Complex(complex) => complex.namespace.as_deref(),
        }
    }

    pub fn qualified_name(&self) -> Option<QName> {
        self.name().map(|name| QName::new(self.namespace(), name))
    }

    pub fn base(&self) -> Option<TypeId> {
        match self {
            TypeDef::Simple(simple) => simple.base,
            TypeDef::Complex(complex) => complex.base,
        }
    }

    pub fn type_code(&self) -> Option<&'static str> {
        match self {
            TypeDef::Simple(simple) => simple.type_code,
            TypeDef::Complex(complex) => complex.type_code,
        }
    }

    /// Canonical value type name: the built-in type code, else the declared name
    pub fn value_type_name(&self) -> String {
        match self.type_code() {
            Some(code) => code.to_string(),
            None => self.name().unwrap_or_default().to_string(),
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexType> {
        match self {
            TypeDef::Complex(complex) => Some(complex),
            TypeDef::Simple(_) => None,
        }
    }
}

// =============================================================================
// Schema set
// =============================================================================

/// One loaded `.xsd` document
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    /// Key the document was loaded under (file name, or caller-supplied name)
    pub name: String,
    pub path: Option<PathBuf>,
    pub target_namespace: Option<String>,
    /// Top-level element declarations, document order
    pub elements: Vec<ElementId>,
    /// Top-level named groups, document order
    pub groups: Vec<GroupId>,
    /// Top-level named types, document order
    pub types: Vec<TypeId>,
}

/// Where the path emitter starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDecl {
    Element(ElementId),
    Type(TypeId),
}

/// A compiled set of schema documents
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub(crate) documents: Vec<SchemaDocument>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) groups: Vec<GroupDef>,
    pub(crate) attribute_groups: Vec<AttributeGroupDef>,
    pub(crate) global_elements: HashMap<QName, ElementId>,
    pub(crate) global_types: HashMap<QName, TypeId>,
    pub(crate) global_attributes: HashMap<QName, AttributeId>,
    pub(crate) global_groups: HashMap<QName, GroupId>,
    pub(crate) global_attribute_groups: HashMap<QName, AttributeGroupId>,
    pub(crate) any_type: TypeId,
    /// SHA256 over every loaded document, in load order
    pub bundle_hash: String,
}

impl SchemaSet {
    /// An empty set holding only the built-in types
    pub(crate) fn with_builtins() -> Self {
        let mut set = Self {
            documents: Vec::new(),
            elements: Vec::new(),
            types: Vec::new(),
            attributes: Vec::new(),
            groups: Vec::new(),
            attribute_groups: Vec::new(),
            global_elements: HashMap::new(),
            global_types: HashMap::new(),
            global_attributes: HashMap::new(),
            global_groups: HashMap::new(),
            global_attribute_groups: HashMap::new(),
            any_type: TypeId(0),
            bundle_hash: String::new(),
        };
        builtins::register(&mut set);
        set
    }

    /// Parse and compile a single in-memory document
    pub fn parse_str(name: &str, content: &str) -> Result<Self> {
        let mut loader = SchemaLoader::new(LoadConfig::default());
        loader.load_str(name, content)?;
        loader.finish()
    }

    /// Load and compile a document together with its includes and imports
    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        let mut loader = SchemaLoader::new(LoadConfig::default());
        loader.load_file(path)?;
        loader.finish()
    }

    // ========== Arena access ==========

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id.0]
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    pub fn complex_type(&self, id: TypeId) -> Option<&ComplexType> {
        self.type_def(id).as_complex()
    }

    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.0]
    }

    pub fn group(&self, id: GroupId) -> &GroupDef {
        &self.groups[id.0]
    }

    pub fn any_type(&self) -> TypeId {
        self.any_type
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // ========== Lookup by qualified name ==========

    pub fn global_element(&self, name: &QName) -> Option<ElementId> {
        self.global_elements.get(name).copied()
    }

    pub fn global_type(&self, name: &QName) -> Option<TypeId> {
        self.global_types.get(name).copied()
    }

    pub fn global_group(&self, name: &QName) -> Option<GroupId> {
        self.global_groups.get(name).copied()
    }

    pub fn global_attribute(&self, name: &QName) -> Option<AttributeId> {
        self.global_attributes.get(name).copied()
    }

    pub fn require_element(&self, name: &QName, kind: ReferenceKind) -> Result<ElementId> {
        self.global_element(name)
            .ok_or_else(|| XsdError::unresolved(kind, name))
    }

    pub fn require_group(&self, name: &QName) -> Result<GroupId> {
        self.global_group(name)
            .ok_or_else(|| XsdError::unresolved(ReferenceKind::Group, name))
    }

    pub fn require_attribute(&self, name: &QName) -> Result<AttributeId> {
        self.global_attribute(name)
            .ok_or_else(|| XsdError::unresolved(ReferenceKind::Attribute, name))
    }

    /// Follow an element reference to its global declaration
    pub fn resolve_element(&self, id: ElementId) -> Result<ElementId> {
        match &self.element(id).ref_name {
            Some(reference) => self.require_element(reference, ReferenceKind::Element),
            None => Ok(id),
        }
    }

    /// Follow an attribute reference to its global declaration
    pub fn resolve_attribute(&self, id: AttributeId) -> Result<AttributeId> {
        match &self.attribute(id).ref_name {
            Some(reference) => self.require_attribute(reference),
            None => Ok(id),
        }
    }

    /// Every global element, document order, documents in load order
    pub fn top_level_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.documents.iter().flat_map(|doc| doc.elements.iter().copied())
    }

    /// Distinct target namespaces in load order; the no-namespace schema is `None`
    pub fn target_namespaces(&self) -> Vec<Option<&str>> {
        let mut namespaces: Vec<Option<&str>> = Vec::new();
        for doc in &self.documents {
            let ns = doc.target_namespace.as_deref();
            if !namespaces.contains(&ns) {
                namespaces.push(ns);
            }
        }
        namespaces
    }

    /// Find a root declaration by name.
    ///
    /// `namespace:name` (split at the last colon) is looked up as a global
    /// type first, then as a global element. A plain name is searched among
    /// the global elements of every loaded namespace.
    pub fn find_root(&self, name: &str) -> Option<RootDecl> {
        if name.contains(':') {
            let qname = QName::parse_qualified(name);
            return self
                .global_type(&qname)
                .map(RootDecl::Type)
                .or_else(|| self.global_element(&qname).map(RootDecl::Element));
        }

        self.target_namespaces()
            .into_iter()
            .find_map(|ns| self.global_element(&QName::new(ns, name)))
            .map(RootDecl::Element)
    }

    /// Global element and type names, for suggestions
    pub fn global_names(&self) -> impl Iterator<Item = &QName> + '_ {
        self.global_elements.keys().chain(self.global_types.keys())
    }

    // ========== Arena construction (loader only) ==========

    pub(crate) fn push_element(&mut self, decl: ElementDecl) -> ElementId {
        self.elements.push(decl);
        ElementId(self.elements.len() - 1)
    }

    pub(crate) fn push_type(&mut self, def: TypeDef) -> TypeId {
        self.types.push(def);
        TypeId(self.types.len() - 1)
    }

    pub(crate) fn push_attribute(&mut self, decl: AttributeDecl) -> AttributeId {
        self.attributes.push(decl);
        AttributeId(self.attributes.len() - 1)
    }

    pub(crate) fn push_group(&mut self, def: GroupDef) -> GroupId {
        self.groups.push(def);
        GroupId(self.groups.len() - 1)
    }

    pub(crate) fn push_attribute_group(&mut self, def: AttributeGroupDef) -> AttributeGroupId {
        self.attribute_groups.push(def);
        AttributeGroupId(self.attribute_groups.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::local("Root").to_string(), "Root");
        assert_eq!(
            QName::xs("string").to_string(),
            "http://www.w3.org/2001/XMLSchema:string"
        );
        assert_eq!(QName::new(Some(""), "x"), QName::local("x"));
    }

    #[test]
    fn test_parse_qualified_splits_at_last_colon() {
        let qname = QName::parse_qualified("http://www.fpml.org/FpML-5/confirmation:trade");
        assert_eq!(qname.namespace.as_deref(), Some("http://www.fpml.org/FpML-5/confirmation"));
        assert_eq!(qname.name, "trade");
        assert_eq!(QName::parse_qualified("trade"), QName::local("trade"));
    }

    #[test]
    fn test_annotation_text_joins_fragments() {
        let annotation = Annotation {
            fragments: vec!["First".into(), "second".into()],
        };
        assert_eq!(annotation.text(), "First second");
        assert_eq!(Annotation::default().text(), "");
    }

    #[test]
    fn test_builtins_resolve() {
        let set = SchemaSet::with_builtins();
        let string = set.global_type(&QName::xs("string")).unwrap();
        assert_eq!(set.type_def(string).value_type_name(), "String");
        assert_eq!(set.type_def(set.any_type()).value_type_name(), "Item");
    }

    #[test]
    fn test_particle_emptiness() {
        let empty = Particle::Sequence(ModelGroup::default());
        assert!(empty.is_empty());
        let nested = Particle::Choice(ModelGroup {
            items: vec![empty.clone(), Particle::Any(Wildcard::default())],
            occurs: Occurs::default(),
        });
        assert!(!nested.is_empty());
    }
}

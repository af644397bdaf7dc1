//! Schema Loading
//!
//! Parses `.xsd` documents with roxmltree into a [`SchemaSet`], following
//! `xs:include`, `xs:import` and `xs:redefine` locations relative to the
//! referencing document, then compiles the set: type names and bases are
//! resolved, group references inlined, content types and attribute uses
//! computed.

use roxmltree::{Document, Node, ParsingOptions};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{
    Annotation, AttributeDecl, AttributeGroupDef, AttributeId, AttributeUse, ComplexType,
    ContentModel, ContentModelKind, ContentType, Derivation, DerivationMethod, ElementDecl,
    ElementId, GroupDef, GroupId, GroupRef, MaxOccurs, ModelGroup, Occurs, Particle, QName,
    SchemaDocument, SchemaSet, SimpleType, SimpleVariety, TypeDef, TypeId, Wildcard, XS_NS,
};
use crate::error::{ReferenceKind, Result, XsdError};

/// Configuration for schema loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Follow `xs:include`, `xs:import` and `xs:redefine` locations
    pub follow_imports: bool,
    /// Skip files matching these path prefixes when loading a directory
    pub skip_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            follow_imports: true,
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
        }
    }
}

/// Accumulates documents into a schema set, then compiles it
pub struct SchemaLoader {
    config: LoadConfig,
    set: SchemaSet,
    /// Canonical path plus the namespace a chameleon document was adopted into
    loaded: HashSet<(PathBuf, Option<String>)>,
    hasher: Sha256,
}

impl SchemaLoader {
    pub fn new(config: LoadConfig) -> Self {
        Self {
            config,
            set: SchemaSet::with_builtins(),
            loaded: HashSet::new(),
            hasher: Sha256::new(),
        }
    }

    /// Load an in-memory document. Relative schema locations resolve
    /// against the working directory.
    pub fn load_str(&mut self, name: &str, content: &str) -> Result<()> {
        self.load_content(name, content, None, None).map(|_| ())
    }

    /// Load a document from disk together with everything it references.
    /// A file already loaded (by canonical path) is ignored, except that a
    /// document without a target namespace is loaded once per namespace that
    /// includes it.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        self.load_path(path, None).map(|_| ())
    }

    /// Load every `.xsd` file under a directory, returning how many new
    /// documents were read
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        let before = self.set.documents.len();

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|ext| ext == "xsd").unwrap_or(false))
            .collect();
        files.sort();

        for path in files {
            let relative = path.strip_prefix(dir).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            if self.config.skip_prefixes.iter().any(|p| relative.starts_with(p.as_str())) {
                debug!(path = %relative, "Skipping schema file");
                continue;
            }
            self.load_path(&path, None)?;
        }

        let loaded = self.set.documents.len() - before;
        info!(dir = %dir.display(), loaded, "Loaded schema directory");
        Ok(loaded)
    }

    /// Number of documents loaded so far
    pub fn document_count(&self) -> usize {
        self.set.documents.len()
    }

    /// Compile the loaded documents into a navigable set
    pub fn finish(self) -> Result<SchemaSet> {
        let mut set = self.set;
        set.bundle_hash = format!("{:x}", self.hasher.finalize());
        Compiler::new(&mut set).run()?;
        info!(
            documents = set.documents.len(),
            elements = set.elements.len(),
            types = set.types.len(),
            "Compiled schema set"
        );
        Ok(set)
    }

    fn load_path(&mut self, path: &Path, including_ns: Option<&str>) -> Result<bool> {
        let canonical = path.canonicalize()?;
        let content = fs::read_to_string(&canonical)?;
        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| canonical.display().to_string());

        self.load_content(&name, &content, Some(&canonical), including_ns)
    }

    fn load_content(
        &mut self,
        name: &str,
        content: &str,
        path: Option<&Path>,
        including_ns: Option<&str>,
    ) -> Result<bool> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = Document::parse_with_options(content, options)?;
        let root = doc.root_element();

        if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XS_NS) {
            return Err(XsdError::invalid(name, "Root element must be xs:schema"));
        }

        let declared_ns = root.attribute("targetNamespace").filter(|ns| !ns.is_empty());
        let (target_ns, chameleon) = match declared_ns {
            Some(ns) => (Some(ns), false),
            None => (including_ns, including_ns.is_some()),
        };

        if let Some(path) = path {
            let adopted = if chameleon { target_ns.map(str::to_string) } else { None };
            if !self.loaded.insert((path.to_path_buf(), adopted)) {
                return Ok(false);
            }
        }
        self.hasher.update(content.as_bytes());

        let document = self.set.documents.len();
        self.set.documents.push(SchemaDocument {
            name: name.to_string(),
            path: path.map(Path::to_path_buf),
            target_namespace: target_ns.map(str::to_string),
            ..SchemaDocument::default()
        });
        debug!(document = name, namespace = target_ns.unwrap_or(""), "Loading schema document");

        let mut redefines = Vec::new();
        if self.config.follow_imports {
            let base_dir = path.and_then(Path::parent);
            for child in xs_children(root) {
                match child.tag_name().name() {
                    "include" => {
                        self.load_location(name, child, base_dir, target_ns)?;
                    }
                    "redefine" => {
                        self.load_location(name, child, base_dir, target_ns)?;
                        redefines.push(child);
                    }
                    "import" => {
                        if child.attribute("schemaLocation").is_none() {
                            debug!(
                                namespace = child.attribute("namespace").unwrap_or(""),
                                "Skipping import without a location"
                            );
                            continue;
                        }
                        self.load_location(name, child, base_dir, None)?;
                    }
                    _ => {}
                }
            }
        }

        let mut parser = DocParser {
            set: &mut self.set,
            document,
            document_name: name.to_string(),
            target_ns: target_ns.map(str::to_string),
            chameleon,
            qualified_elements: root.attribute("elementFormDefault") == Some("qualified"),
            qualified_attributes: root.attribute("attributeFormDefault") == Some("qualified"),
        };
        parser.parse_components(root)?;
        for redefine in redefines {
            parser.parse_redefine(redefine)?;
        }
        Ok(true)
    }

    fn load_location(
        &mut self,
        document: &str,
        directive: Node,
        base_dir: Option<&Path>,
        including_ns: Option<&str>,
    ) -> Result<()> {
        let location = match directive.attribute("schemaLocation") {
            Some(location) => location,
            None => {
                return Err(XsdError::invalid(
                    document,
                    format!("xs:{} requires a schemaLocation", directive.tag_name().name()),
                ))
            }
        };

        if location.starts_with("http://") || location.starts_with("https://") {
            warn!(location, "Remote schema locations are not retrieved");
            return Ok(());
        }

        let path = match base_dir {
            Some(dir) => dir.join(location),
            None => PathBuf::from(location),
        };
        if !path.exists() {
            return Err(XsdError::invalid(
                document,
                format!("Referenced schema not found: {}", location),
            ));
        }
        self.load_path(&path, including_ns)?;
        Ok(())
    }
}

// =============================================================================
// Document parsing
// =============================================================================

fn xs_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().namespace() == Some(XS_NS))
}

fn xs_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    xs_children(node).find(|n| n.tag_name().name() == name)
}

fn is_particle(name: &str) -> bool {
    matches!(name, "sequence" | "choice" | "all" | "group" | "element" | "any")
}

struct DocParser<'s> {
    set: &'s mut SchemaSet,
    document: usize,
    document_name: String,
    target_ns: Option<String>,
    /// Unqualified references adopt the including namespace
    chameleon: bool,
    qualified_elements: bool,
    qualified_attributes: bool,
}

impl<'s> DocParser<'s> {
    fn invalid(&self, message: impl Into<String>) -> XsdError {
        XsdError::invalid(self.document_name.clone(), message)
    }

    fn global_name(&self, node: Node, what: &str) -> Result<String> {
        node.attribute("name")
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("Global {} without a name", what)))
    }

    fn qualify(&self, name: &str) -> QName {
        QName::new(self.target_ns.as_deref(), name)
    }

    /// Resolve a `prefix:local` attribute value against the in-scope namespaces
    fn qname(&self, node: Node, value: &str) -> Result<QName> {
        let value = value.trim();
        let (prefix, local) = match value.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value),
        };
        let namespace = node.lookup_namespace_uri(prefix);
        if prefix.is_some() && namespace.is_none() {
            return Err(self.invalid(format!("Undeclared namespace prefix in '{}'", value)));
        }
        match namespace {
            Some(ns) => Ok(QName::new(Some(ns), local)),
            None if self.chameleon => Ok(self.qualify(local)),
            None => Ok(QName::local(local)),
        }
    }

    fn qname_attr(&self, node: Node, attr: &str) -> Result<Option<QName>> {
        node.attribute(attr).map(|v| self.qname(node, v)).transpose()
    }

    fn parse_occurs(&self, node: Node) -> Result<Occurs> {
        let min = match node.attribute("minOccurs").map(str::trim) {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| self.invalid(format!("Invalid minOccurs '{}'", v)))?,
            None => 1,
        };
        let max = match node.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => MaxOccurs::Unbounded,
            Some(v) => MaxOccurs::Bounded(
                v.parse::<u64>()
                    .map_err(|_| self.invalid(format!("Invalid maxOccurs '{}'", v)))?,
            ),
            None => MaxOccurs::Bounded(1),
        };
        Ok(Occurs { min, max })
    }

    fn parse_annotation(&self, node: Node) -> Annotation {
        let mut fragments = Vec::new();
        for annotation in xs_children(node).filter(|n| n.tag_name().name() == "annotation") {
            for item in xs_children(annotation) {
                if !matches!(item.tag_name().name(), "documentation" | "appinfo") {
                    continue;
                }
                for markup in item.children() {
                    let text: String = if markup.is_text() {
                        markup.text().unwrap_or_default().to_string()
                    } else if markup.is_element() {
                        markup
                            .descendants()
                            .filter(|d| d.is_text())
                            .filter_map(|d| d.text())
                            .collect()
                    } else {
                        continue;
                    };
                    let text = text.trim();
                    if !text.is_empty() {
                        fragments.push(text.to_string());
                    }
                }
            }
        }
        Annotation { fragments }
    }

    /// Attributes outside the XML Schema namespace, keyed `prefix:local`
    fn extra_attributes(&self, node: Node) -> Vec<(String, String)> {
        node.attributes()
            .filter_map(|attr| {
                let ns = attr.namespace()?;
                if ns == XS_NS {
                    return None;
                }
                let key = match node.lookup_prefix(ns) {
                    Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
                    _ => attr.name().to_string(),
                };
                Some((key, attr.value().to_string()))
            })
            .collect()
    }

    // ========== Top level ==========

    fn parse_components(&mut self, root: Node) -> Result<()> {
        for child in xs_children(root) {
            self.parse_top_level(child, false)?;
        }
        Ok(())
    }

    fn parse_top_level(&mut self, child: Node, redefine: bool) -> Result<()> {
        match child.tag_name().name() {
            "element" => {
                let id = self.parse_element(child, true)?;
                let qname = self.qualify(&self.global_name(child, "element")?);
                self.set.global_elements.insert(qname, id);
                self.set.documents[self.document].elements.push(id);
            }
            "complexType" | "simpleType" => {
                let qname = self.qualify(&self.global_name(child, "type")?);
                let previous = self.set.global_type(&qname);
                let id = if child.tag_name().name() == "complexType" {
                    self.parse_complex_type(child)?
                } else {
                    self.parse_simple_type(child)?
                };
                if redefine {
                    self.link_redefined_base(id, &qname, previous);
                }
                self.set.global_types.insert(qname, id);
                self.set.documents[self.document].types.push(id);
            }
            "group" => {
                let id = self.parse_group(child)?;
                let qname = self.set.group(id).qualified_name();
                self.set.global_groups.insert(qname, id);
                self.set.documents[self.document].groups.push(id);
            }
            "attribute" => {
                let id = self.parse_attribute(child, true)?;
                let qname = self.qualify(&self.global_name(child, "attribute")?);
                self.set.global_attributes.insert(qname, id);
            }
            "attributeGroup" => {
                let name = self.global_name(child, "attributeGroup")?;
                let (attributes, group_refs) = self.parse_attribute_list(child)?;
                let id = self.set.push_attribute_group(AttributeGroupDef {
                    name: name.clone(),
                    namespace: self.target_ns.clone(),
                    attributes,
                    group_refs,
                });
                self.set.global_attribute_groups.insert(self.qualify(&name), id);
            }
            _ => {}
        }
        Ok(())
    }

    /// Redefinitions replace the included components of the same name
    fn parse_redefine(&mut self, redefine: Node) -> Result<()> {
        for child in xs_children(redefine) {
            self.parse_top_level(child, true)?;
        }
        Ok(())
    }

    /// A redefined type derives from the original it replaces
    fn link_redefined_base(&mut self, id: TypeId, name: &QName, original: Option<TypeId>) {
        let Some(original) = original else {
            return;
        };
        match &mut self.set.types[id.0] {
            TypeDef::Complex(complex) => {
                if complex.derivation().map(|d| &d.base_name) == Some(name) {
                    complex.base = Some(original);
                }
            }
            TypeDef::Simple(simple) => {
                if simple.base_name.as_ref() == Some(name) {
                    simple.base = Some(original);
                }
            }
        }
    }

    // ========== Elements and attributes ==========

    fn parse_element(&mut self, node: Node, is_global: bool) -> Result<ElementId> {
        let name = node.attribute("name").map(str::to_string);
        let ref_name = self.qname_attr(node, "ref")?;
        if name.is_none() && ref_name.is_none() {
            return Err(self.invalid("Element declares neither name nor ref"));
        }

        let qualified = is_global
            || match node.attribute("form") {
                Some(form) => form == "qualified",
                None => self.qualified_elements,
            };

        let inline_type = match xs_children(node)
            .find(|n| matches!(n.tag_name().name(), "complexType" | "simpleType"))
        {
            Some(child) if child.tag_name().name() == "complexType" => {
                Some(self.parse_complex_type(child)?)
            }
            Some(child) => Some(self.parse_simple_type(child)?),
            None => None,
        };

        let decl = ElementDecl {
            name,
            namespace: if qualified { self.target_ns.clone() } else { None },
            type_name: self.qname_attr(node, "type")?,
            substitution_group: self.qname_attr(node, "substitutionGroup")?,
            occurs: if is_global {
                Occurs::default()
            } else {
                self.parse_occurs(node)?
            },
            is_global,
            is_abstract: node.attribute("abstract") == Some("true"),
            annotation: self.parse_annotation(node),
            extra_attributes: self.extra_attributes(node),
            ref_name,
            inline_type,
            resolved_type: None,
        };
        Ok(self.set.push_element(decl))
    }

    fn parse_attribute(&mut self, node: Node, is_global: bool) -> Result<AttributeId> {
        let name = node.attribute("name").map(str::to_string);
        let ref_name = self.qname_attr(node, "ref")?;
        if name.is_none() && ref_name.is_none() {
            return Err(self.invalid("Attribute declares neither name nor ref"));
        }

        let qualified = is_global
            || match node.attribute("form") {
                Some(form) => form == "qualified",
                None => self.qualified_attributes,
            };

        let inline_type = match xs_child(node, "simpleType") {
            Some(child) => Some(self.parse_simple_type(child)?),
            None => None,
        };

        let use_ = match node.attribute("use") {
            Some("required") => AttributeUse::Required,
            Some("prohibited") => AttributeUse::Prohibited,
            _ => AttributeUse::Optional,
        };

        let decl = AttributeDecl {
            name,
            namespace: if qualified { self.target_ns.clone() } else { None },
            ref_name,
            type_name: self.qname_attr(node, "type")?,
            inline_type,
            use_,
            is_global,
            annotation: self.parse_annotation(node),
            extra_attributes: self.extra_attributes(node),
        };
        Ok(self.set.push_attribute(decl))
    }

    /// Local attributes and attribute group references of a container
    fn parse_attribute_list(&mut self, node: Node) -> Result<(Vec<AttributeId>, Vec<QName>)> {
        let mut attributes = Vec::new();
        let mut group_refs = Vec::new();
        for child in xs_children(node) {
            match child.tag_name().name() {
                "attribute" => attributes.push(self.parse_attribute(child, false)?),
                "attributeGroup" => {
                    if let Some(reference) = self.qname_attr(child, "ref")? {
                        group_refs.push(reference);
                    }
                }
                _ => {}
            }
        }
        Ok((attributes, group_refs))
    }

    // ========== Particles ==========

    fn parse_particle(&mut self, node: Node) -> Result<Option<Particle>> {
        let particle = match node.tag_name().name() {
            "element" => Particle::Element(self.parse_element(node, false)?),
            "sequence" | "all" => Particle::Sequence(self.parse_model_group(node)?),
            "choice" => Particle::Choice(self.parse_model_group(node)?),
            "any" => Particle::Any(Wildcard {
                namespace: node.attribute("namespace").map(str::to_string),
                process_contents: node.attribute("processContents").map(str::to_string),
                occurs: self.parse_occurs(node)?,
            }),
            "group" => match self.qname_attr(node, "ref")? {
                Some(name) => Particle::GroupRef(GroupRef {
                    name,
                    occurs: self.parse_occurs(node)?,
                }),
                None => return Err(self.invalid("Local group without a ref")),
            },
            _ => return Ok(None),
        };
        Ok(Some(particle))
    }

    fn parse_model_group(&mut self, node: Node) -> Result<ModelGroup> {
        let mut items = Vec::new();
        for child in xs_children(node) {
            if let Some(particle) = self.parse_particle(child)? {
                items.push(particle);
            }
        }
        Ok(ModelGroup {
            items,
            occurs: self.parse_occurs(node)?,
        })
    }

    /// The first particle child of a type, group or derivation
    fn parse_content_particle(&mut self, node: Node) -> Result<Option<Particle>> {
        match xs_children(node).find(|n| is_particle(n.tag_name().name())) {
            Some(child) => self.parse_particle(child),
            None => Ok(None),
        }
    }

    fn parse_group(&mut self, node: Node) -> Result<GroupId> {
        let name = self.global_name(node, "group")?;
        let particle = self.parse_content_particle(node)?;
        let def = GroupDef {
            name,
            namespace: self.target_ns.clone(),
            particle,
            compiled: None,
            annotation: self.parse_annotation(node),
        };
        Ok(self.set.push_group(def))
    }

    // ========== Types ==========

    fn parse_complex_type(&mut self, node: Node) -> Result<TypeId> {
        let mut complex = ComplexType {
            name: node.attribute("name").map(str::to_string),
            namespace: self.target_ns.clone(),
            mixed: node.attribute("mixed") == Some("true"),
            is_abstract: node.attribute("abstract") == Some("true"),
            annotation: self.parse_annotation(node),
            ..ComplexType::default()
        };

        let content = xs_children(node)
            .find(|n| matches!(n.tag_name().name(), "simpleContent" | "complexContent"));

        match content {
            Some(content) => {
                let kind = if content.tag_name().name() == "simpleContent" {
                    ContentModelKind::Simple
                } else {
                    ContentModelKind::Complex
                };
                if content.attribute("mixed") == Some("true") {
                    complex.mixed = true;
                }
                let derivation_node = xs_children(content)
                    .find(|n| matches!(n.tag_name().name(), "extension" | "restriction"))
                    .ok_or_else(|| self.invalid("Content model without extension or restriction"))?;
                let method = if derivation_node.tag_name().name() == "extension" {
                    DerivationMethod::Extension
                } else {
                    DerivationMethod::Restriction
                };
                let base_name = self
                    .qname_attr(derivation_node, "base")?
                    .ok_or_else(|| self.invalid("Derivation without a base"))?;
                let particle = match kind {
                    ContentModelKind::Complex => self.parse_content_particle(derivation_node)?,
                    ContentModelKind::Simple => None,
                };
                let (attributes, group_refs) = self.parse_attribute_list(derivation_node)?;
                complex.attributes = attributes;
                complex.attribute_group_refs = group_refs;
                complex.content_model = Some(ContentModel {
                    kind,
                    derivation: Derivation {
                        method,
                        base_name,
                        particle,
                    },
                });
            }
            None => {
                complex.particle = self.parse_content_particle(node)?;
                let (attributes, group_refs) = self.parse_attribute_list(node)?;
                complex.attributes = attributes;
                complex.attribute_group_refs = group_refs;
            }
        }

        Ok(self.set.push_type(TypeDef::Complex(complex)))
    }

    fn parse_simple_type(&mut self, node: Node) -> Result<TypeId> {
        let mut simple = SimpleType {
            name: node.attribute("name").map(str::to_string),
            namespace: self.target_ns.clone(),
            annotation: self.parse_annotation(node),
            ..SimpleType::default()
        };

        if let Some(restriction) = xs_child(node, "restriction") {
            simple.base_name = self.qname_attr(restriction, "base")?;
            if simple.base_name.is_none() {
                if let Some(inline) = xs_child(restriction, "simpleType") {
                    simple.base = Some(self.parse_simple_type(inline)?);
                }
            }
        } else if let Some(list) = xs_child(node, "list") {
            simple.variety = SimpleVariety::List;
            simple.base_name = Some(QName::xs("anySimpleType"));
            if let Some(inline) = xs_child(list, "simpleType") {
                self.parse_simple_type(inline)?;
            }
        } else if let Some(union) = xs_child(node, "union") {
            simple.variety = SimpleVariety::Union;
            simple.base_name = Some(QName::xs("anySimpleType"));
            for inline in xs_children(union).filter(|n| n.tag_name().name() == "simpleType") {
                self.parse_simple_type(inline)?;
            }
        }

        Ok(self.set.push_type(TypeDef::Simple(simple)))
    }
}

// =============================================================================
// Compilation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    InProgress,
    Done,
}

struct Compiler<'s> {
    set: &'s mut SchemaSet,
    type_state: Vec<State>,
    group_state: Vec<State>,
}

impl<'s> Compiler<'s> {
    fn new(set: &'s mut SchemaSet) -> Self {
        let type_state = vec![State::Pending; set.types.len()];
        let group_state = vec![State::Pending; set.groups.len()];
        Self {
            set,
            type_state,
            group_state,
        }
    }

    fn run(mut self) -> Result<()> {
        self.resolve_type_bases()?;
        for index in 0..self.set.types.len() {
            self.simple_type_code(TypeId(index))?;
        }
        for index in 0..self.set.groups.len() {
            self.compile_group(GroupId(index))?;
        }
        for index in 0..self.set.types.len() {
            self.compile_type(TypeId(index))?;
        }
        let mut resolving = HashSet::new();
        for index in 0..self.set.elements.len() {
            self.element_type(ElementId(index), &mut resolving)?;
        }
        Ok(())
    }

    fn lookup_type(&self, name: &QName) -> Result<TypeId> {
        self.set
            .global_type(name)
            .ok_or_else(|| XsdError::unresolved(ReferenceKind::Type, name))
    }

    fn resolve_type_bases(&mut self) -> Result<()> {
        let any_type = self.set.any_type;
        for index in 0..self.set.types.len() {
            if TypeId(index) == any_type {
                continue;
            }
            let base = match &self.set.types[index] {
                TypeDef::Simple(simple) => match (&simple.base, &simple.base_name) {
                    (None, Some(name)) => Some(self.lookup_type(name)?),
                    _ => None,
                },
                TypeDef::Complex(complex) => match (&complex.base, complex.derivation()) {
                    (None, Some(derivation)) => Some(self.lookup_type(&derivation.base_name)?),
                    (None, None) => Some(any_type),
                    _ => None,
                },
            };
            if let Some(base) = base {
                match &mut self.set.types[index] {
                    TypeDef::Simple(simple) => simple.base = Some(base),
                    TypeDef::Complex(complex) => complex.base = Some(base),
                }
            }
        }

        // Anonymous restrictions of anonymous bases and lists have no name to resolve
        let any_simple = self.lookup_type(&QName::xs("anySimpleType"))?;
        for def in self.set.types.iter_mut() {
            if let TypeDef::Simple(simple) = def {
                if simple.base.is_none() && simple.name.as_deref() != Some("anySimpleType") {
                    simple.base = Some(any_simple);
                }
            }
        }
        Ok(())
    }

    /// Atomic restrictions inherit the type code of their base
    fn simple_type_code(&mut self, id: TypeId) -> Result<Option<&'static str>> {
        let (code, variety, base) = match &self.set.types[id.0] {
            TypeDef::Simple(simple) => (simple.type_code, simple.variety, simple.base),
            TypeDef::Complex(complex) => return Ok(complex.type_code),
        };
        if code.is_some() || variety != SimpleVariety::Atomic {
            return Ok(code);
        }
        let Some(base) = base else {
            return Ok(None);
        };

        if self.type_state[id.0] == State::InProgress {
            return Err(XsdError::invalid(
                self.type_label(id),
                "Circular simple type derivation",
            ));
        }
        self.type_state[id.0] = State::InProgress;
        let inherited = self.simple_type_code(base)?;
        self.type_state[id.0] = State::Pending;

        if let TypeDef::Simple(simple) = &mut self.set.types[id.0] {
            simple.type_code = inherited;
        }
        Ok(inherited)
    }

    fn type_label(&self, id: TypeId) -> String {
        self.set.types[id.0]
            .qualified_name()
            .map(|q| q.to_string())
            .unwrap_or_else(|| format!("anonymous type #{}", id.0))
    }

    // ========== Groups ==========

    fn compile_group(&mut self, id: GroupId) -> Result<()> {
        match self.group_state[id.0] {
            State::Done => return Ok(()),
            State::InProgress => {
                let name = self.set.groups[id.0].qualified_name();
                return Err(XsdError::invalid(
                    name.to_string(),
                    "Circular model group reference",
                ));
            }
            State::Pending => {}
        }
        self.group_state[id.0] = State::InProgress;
        let compiled = match self.set.groups[id.0].particle.clone() {
            Some(particle) => Some(self.inline_groups(&particle)?),
            None => None,
        };
        self.set.groups[id.0].compiled = compiled;
        self.group_state[id.0] = State::Done;
        Ok(())
    }

    /// Replace group references with the referenced group bodies
    fn inline_groups(&mut self, particle: &Particle) -> Result<Particle> {
        Ok(match particle {
            Particle::GroupRef(reference) => {
                let group = self
                    .set
                    .global_group(&reference.name)
                    .ok_or_else(|| XsdError::unresolved(ReferenceKind::Group, &reference.name))?;
                self.compile_group(group)?;
                match self.set.groups[group.0].compiled.clone() {
                    Some(Particle::Sequence(body)) => Particle::Sequence(ModelGroup {
                        items: body.items,
                        occurs: reference.occurs,
                    }),
                    Some(Particle::Choice(body)) => Particle::Choice(ModelGroup {
                        items: body.items,
                        occurs: reference.occurs,
                    }),
                    Some(other) => other,
                    None => Particle::Sequence(ModelGroup {
                        items: Vec::new(),
                        occurs: reference.occurs,
                    }),
                }
            }
            Particle::Sequence(group) => Particle::Sequence(self.inline_model_group(group)?),
            Particle::Choice(group) => Particle::Choice(self.inline_model_group(group)?),
            Particle::Element(_) | Particle::Any(_) => particle.clone(),
        })
    }

    fn inline_model_group(&mut self, group: &ModelGroup) -> Result<ModelGroup> {
        let mut items = Vec::with_capacity(group.items.len());
        for item in &group.items {
            items.push(self.inline_groups(item)?);
        }
        Ok(ModelGroup {
            items,
            occurs: group.occurs,
        })
    }

    // ========== Complex types ==========

    fn compile_type(&mut self, id: TypeId) -> Result<()> {
        if id == self.set.any_type {
            self.type_state[id.0] = State::Done;
            return Ok(());
        }
        match self.type_state[id.0] {
            State::Done => return Ok(()),
            State::InProgress => {
                return Err(XsdError::invalid(
                    self.type_label(id),
                    "Circular complex type derivation",
                ))
            }
            State::Pending => {}
        }

        let complex = match &self.set.types[id.0] {
            TypeDef::Complex(complex) => complex.clone(),
            TypeDef::Simple(_) => {
                self.type_state[id.0] = State::Done;
                return Ok(());
            }
        };

        self.type_state[id.0] = State::InProgress;
        let base = complex.base.unwrap_or(self.set.any_type);
        self.compile_type(base)?;

        let (base_particle, base_attributes, base_code) = match &self.set.types[base.0] {
            TypeDef::Complex(base_def) => (
                base_def.content_particle.clone(),
                base_def.attribute_uses.clone(),
                base_def.type_code,
            ),
            TypeDef::Simple(simple) => (None, Vec::new(), simple.type_code),
        };

        let own_particle = match complex
            .derivation()
            .and_then(|d| d.particle.as_ref())
            .or(complex.particle.as_ref())
        {
            Some(particle) => Some(self.inline_groups(particle)?),
            None => None,
        };
        let own_particle = own_particle.filter(|p| !p.is_empty());

        let mut type_code = None;
        let (content_type, content_particle) = match &complex.content_model {
            Some(model) if model.kind == ContentModelKind::Simple => {
                type_code = base_code.filter(|code| *code != super::builtins::ANY_TYPE_CODE);
                (ContentType::TextOnly, None)
            }
            Some(model) if model.derivation.method == DerivationMethod::Extension => {
                let inherited = if base == self.set.any_type {
                    None
                } else {
                    base_particle.filter(|p| !p.is_empty())
                };
                let combined = match (inherited, own_particle) {
                    (Some(inherited), Some(own)) => Some(Particle::Sequence(ModelGroup {
                        items: vec![inherited, own],
                        occurs: Occurs::default(),
                    })),
                    (inherited, own) => inherited.or(own),
                };
                classify(combined, complex.mixed)
            }
            _ => classify(own_particle, complex.mixed),
        };

        let attribute_uses = self.attribute_uses(&complex, base_attributes)?;

        if let TypeDef::Complex(target) = &mut self.set.types[id.0] {
            target.content_type = content_type;
            target.content_particle = content_particle;
            target.attribute_uses = attribute_uses;
            target.type_code = type_code;
        }
        self.type_state[id.0] = State::Done;
        Ok(())
    }

    /// Inherited uses, overridden by own declarations of the same name
    fn attribute_uses(
        &self,
        complex: &ComplexType,
        inherited: Vec<AttributeId>,
    ) -> Result<Vec<AttributeId>> {
        let mut own = complex.attributes.clone();
        let mut visited = HashSet::new();
        for reference in &complex.attribute_group_refs {
            self.flatten_attribute_group(reference, &mut own, &mut visited)?;
        }

        let mut uses = inherited;
        for id in own {
            let name = self.set.attribute(id).display_name().to_string();
            let existing = uses
                .iter()
                .position(|u| self.set.attribute(*u).display_name() == name);
            let prohibited = self.set.attribute(id).use_ == AttributeUse::Prohibited;
            match (existing, prohibited) {
                (Some(index), true) => {
                    uses.remove(index);
                }
                (Some(index), false) => uses[index] = id,
                (None, true) => {}
                (None, false) => uses.push(id),
            }
        }
        Ok(uses)
    }

    fn flatten_attribute_group(
        &self,
        name: &QName,
        out: &mut Vec<AttributeId>,
        visited: &mut HashSet<QName>,
    ) -> Result<()> {
        if !visited.insert(name.clone()) {
            return Ok(());
        }
        let id = self
            .set
            .global_attribute_groups
            .get(name)
            .copied()
            .ok_or_else(|| XsdError::unresolved(ReferenceKind::AttributeGroup, name))?;
        let group = &self.set.attribute_groups[id.0];
        out.extend(group.attributes.iter().copied());
        for nested in &group.group_refs {
            self.flatten_attribute_group(nested, out, visited)?;
        }
        Ok(())
    }

    // ========== Elements ==========

    fn element_type(&mut self, id: ElementId, resolving: &mut HashSet<ElementId>) -> Result<Option<TypeId>> {
        let decl = &self.set.elements[id.0];
        if decl.is_reference() {
            return Ok(None);
        }
        if let Some(resolved) = decl.resolved_type {
            return Ok(Some(resolved));
        }

        let resolved = if let Some(inline) = decl.inline_type {
            inline
        } else if let Some(type_name) = decl.type_name.clone() {
            self.lookup_type(&type_name)?
        } else if let Some(head_name) = decl.substitution_group.clone() {
            let head = self
                .set
                .global_element(&head_name)
                .ok_or_else(|| XsdError::unresolved(ReferenceKind::SubstitutionGroup, &head_name))?;
            if !resolving.insert(id) {
                return Err(XsdError::invalid(
                    head_name.to_string(),
                    "Circular substitution group",
                ));
            }
            let head_type = self.element_type(head, resolving)?;
            resolving.remove(&id);
            head_type.unwrap_or(self.set.any_type)
        } else {
            self.set.any_type
        };

        self.set.elements[id.0].resolved_type = Some(resolved);
        Ok(Some(resolved))
    }
}

fn classify(particle: Option<Particle>, mixed: bool) -> (ContentType, Option<Particle>) {
    match (particle, mixed) {
        (Some(particle), true) => (ContentType::Mixed, Some(particle)),
        (Some(particle), false) => (ContentType::ElementOnly, Some(particle)),
        (None, true) => (ContentType::TextOnly, None),
        (None, false) => (ContentType::Empty, None),
    }
}

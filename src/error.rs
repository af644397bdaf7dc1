//! Error types for schema loading and traversal

use std::fmt;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, XsdError>;

/// What kind of declaration a failed name lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Element,
    Type,
    Group,
    Attribute,
    AttributeGroup,
    SubstitutionGroup,
    Root,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReferenceKind::Element => "element",
            ReferenceKind::Type => "type",
            ReferenceKind::Group => "group",
            ReferenceKind::Attribute => "attribute",
            ReferenceKind::AttributeGroup => "attribute group",
            ReferenceKind::SubstitutionGroup => "substitution group",
            ReferenceKind::Root => "root node",
        };
        f.write_str(label)
    }
}

/// Schema loading and traversal errors
#[derive(Error, Debug)]
pub enum XsdError {
    #[error("Unresolved {kind} reference: {name}")]
    UnresolvedReference { kind: ReferenceKind, name: String },

    #[error("Unsupported node kind: {0}")]
    UnsupportedNodeKind(&'static str),

    #[error("Dependency cycle detected: {from} -> {to}")]
    DependencyCycle { from: String, to: String },

    #[error("Unable to find a root node, please supply one")]
    NoRootNode,

    #[error("Invalid schema {document}: {message}")]
    InvalidSchema { document: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
}

impl XsdError {
    pub(crate) fn unresolved(kind: ReferenceKind, name: impl ToString) -> Self {
        XsdError::UnresolvedReference {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn invalid(document: impl Into<String>, message: impl Into<String>) -> Self {
        XsdError::InvalidSchema {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Returns true for a failed name lookup
    pub fn is_unresolved(&self) -> bool {
        matches!(self, XsdError::UnresolvedReference { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message() {
        let err = XsdError::unresolved(ReferenceKind::SubstitutionGroup, "fpml:product");
        assert!(err.is_unresolved());
        assert_eq!(
            err.to_string(),
            "Unresolved substitution group reference: fpml:product"
        );
    }

    #[test]
    fn test_invalid_schema_message() {
        let err = XsdError::invalid("main.xsd", "Root element must be xs:schema");
        assert_eq!(
            err.to_string(),
            "Invalid schema main.xsd: Root element must be xs:schema"
        );
    }
}

//! Built-in XML Schema types
//!
//! Every set starts with `anyType`, `anySimpleType` and the primitive and
//! derived simple types registered under the XML Schema namespace. Each
//! carries the type code reported as its value type.

use super::{
    ComplexType, ContentType, ModelGroup, Occurs, MaxOccurs, Particle, QName, SchemaSet,
    SimpleType, TypeDef, Wildcard, XS_NS,
};

/// Value type reported for `anyType`
pub const ANY_TYPE_CODE: &str = "Item";

/// (local name, type code, base local name)
const SIMPLE_TYPES: &[(&str, &str, &str)] = &[
    // Primitives
    ("string", "String", "anySimpleType"),
    ("boolean", "Boolean", "anySimpleType"),
    ("decimal", "Decimal", "anySimpleType"),
    ("float", "Float", "anySimpleType"),
    ("double", "Double", "anySimpleType"),
    ("duration", "Duration", "anySimpleType"),
    ("dateTime", "DateTime", "anySimpleType"),
    ("time", "Time", "anySimpleType"),
    ("date", "Date", "anySimpleType"),
    ("gYearMonth", "GYearMonth", "anySimpleType"),
    ("gYear", "GYear", "anySimpleType"),
    ("gMonthDay", "GMonthDay", "anySimpleType"),
    ("gDay", "GDay", "anySimpleType"),
    ("gMonth", "GMonth", "anySimpleType"),
    ("hexBinary", "HexBinary", "anySimpleType"),
    ("base64Binary", "Base64Binary", "anySimpleType"),
    ("anyURI", "AnyUri", "anySimpleType"),
    ("QName", "QName", "anySimpleType"),
    ("NOTATION", "Notation", "anySimpleType"),
    // Derived from string
    ("normalizedString", "NormalizedString", "string"),
    ("token", "Token", "normalizedString"),
    ("language", "Language", "token"),
    ("NMTOKEN", "NmToken", "token"),
    ("NMTOKENS", "NmToken", "anySimpleType"),
    ("Name", "Name", "token"),
    ("NCName", "NCName", "Name"),
    ("ID", "Id", "NCName"),
    ("IDREF", "Idref", "NCName"),
    ("IDREFS", "Idref", "anySimpleType"),
    ("ENTITY", "Entity", "NCName"),
    ("ENTITIES", "Entity", "anySimpleType"),
    // Derived from decimal
    ("integer", "Integer", "decimal"),
    ("nonPositiveInteger", "NonPositiveInteger", "integer"),
    ("negativeInteger", "NegativeInteger", "nonPositiveInteger"),
    ("long", "Long", "integer"),
    ("int", "Int", "long"),
    ("short", "Short", "int"),
    ("byte", "Byte", "short"),
    ("nonNegativeInteger", "NonNegativeInteger", "integer"),
    ("unsignedLong", "UnsignedLong", "nonNegativeInteger"),
    ("unsignedInt", "UnsignedInt", "unsignedLong"),
    ("unsignedShort", "UnsignedShort", "unsignedInt"),
    ("unsignedByte", "UnsignedByte", "unsignedShort"),
    ("positiveInteger", "PositiveInteger", "nonNegativeInteger"),
];

/// List types among the built-ins
const LIST_TYPES: &[&str] = &["NMTOKENS", "IDREFS", "ENTITIES"];

/// Register the built-in types into an empty set
pub(crate) fn register(set: &mut SchemaSet) {
    let any_type = set.push_type(TypeDef::Complex(ComplexType {
        name: Some("anyType".to_string()),
        namespace: Some(XS_NS.to_string()),
        mixed: true,
        content_type: ContentType::Mixed,
        type_code: Some(ANY_TYPE_CODE),
        content_particle: Some(Particle::Sequence(ModelGroup {
            items: vec![Particle::Any(Wildcard {
                namespace: Some("##any".to_string()),
                process_contents: Some("lax".to_string()),
                occurs: Occurs {
                    min: 0,
                    max: MaxOccurs::Unbounded,
                },
            })],
            occurs: Occurs::default(),
        })),
        ..ComplexType::default()
    }));
    set.any_type = any_type;
    set.global_types.insert(QName::xs("anyType"), any_type);

    let any_simple = set.push_type(TypeDef::Simple(SimpleType {
        name: Some("anySimpleType".to_string()),
        namespace: Some(XS_NS.to_string()),
        base: Some(any_type),
        type_code: Some("AnyAtomicType"),
        ..SimpleType::default()
    }));
    set.global_types.insert(QName::xs("anySimpleType"), any_simple);

    // The table lists every base before the types derived from it
    for (name, code, base) in SIMPLE_TYPES {
        let base_id = set.global_type(&QName::xs(*base));
        let variety = if LIST_TYPES.contains(name) {
            super::SimpleVariety::List
        } else {
            super::SimpleVariety::Atomic
        };
        let id = set.push_type(TypeDef::Simple(SimpleType {
            name: Some(name.to_string()),
            namespace: Some(XS_NS.to_string()),
            base_name: Some(QName::xs(*base)),
            base: base_id,
            variety,
            type_code: Some(*code),
            ..SimpleType::default()
        }));
        set.global_types.insert(QName::xs(*name), id);
    }
}

/// Type code of a built-in type by local name
pub fn type_code(local_name: &str) -> Option<&'static str> {
    match local_name {
        "anyType" => Some(ANY_TYPE_CODE),
        "anySimpleType" => Some("AnyAtomicType"),
        _ => SIMPLE_TYPES
            .iter()
            .find(|(name, _, _)| *name == local_name)
            .map(|(_, code, _)| *code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bases_registered_before_derived() {
        for (index, (_, _, base)) in SIMPLE_TYPES.iter().enumerate() {
            let known = *base == "anySimpleType"
                || SIMPLE_TYPES[..index].iter().any(|(name, _, _)| name == base);
            assert!(known, "base {} must precede its derived types", base);
        }
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(type_code("dateTime"), Some("DateTime"));
        assert_eq!(type_code("anyURI"), Some("AnyUri"));
        assert_eq!(type_code("ID"), Some("Id"));
        assert_eq!(type_code("anyType"), Some("Item"));
        assert_eq!(type_code("Trade"), None);
    }

    #[test]
    fn test_register_links_bases() {
        let set = SchemaSet::with_builtins();
        let int = set.global_type(&QName::xs("int")).unwrap();
        let long = set.global_type(&QName::xs("long")).unwrap();
        assert_eq!(set.type_def(int).base(), Some(long));
        assert!(set.type_def(set.any_type()).base().is_none());
    }
}

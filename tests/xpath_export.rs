//! XPath export tests against fixture schemas

use std::path::Path;

use xsd_helper::export::{loaded_schemas, suggest_roots};
use xsd_helper::{
    extract_xpaths, AttributeLayout, ExportOptions, LoadConfig, Record, ReferenceKind,
    SchemaLoader, SchemaSet, XPathEmitter, XsdError,
};

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

fn load(name: &str) -> SchemaSet {
    let mut loader = SchemaLoader::new(LoadConfig::default());
    loader.load_file(&fixtures_path().join(name)).unwrap();
    loader.finish().unwrap()
}

fn export(schema: &SchemaSet, options: &ExportOptions) -> Vec<String> {
    let mut out = Vec::new();
    extract_xpaths(schema, options, &mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// CSV output
// =============================================================================

#[test]
fn test_annotated_export() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trade".into()),
        extract: vec!["meta:column".into()],
        ..Default::default()
    };

    let lines = export(&schema, &options);
    assert_eq!(
        lines,
        vec![
            "Node,XPath,Annotation,Data Type,Optional,meta:column",
            r#"/trade,/trade,"A single trade",Trade,false,"#,
            r#"trade@version,/trade@version,"",http://www.w3.org/2001/XMLSchema:int"#,
            r#"trade/tradeId,/trade/tradeId,"Unique ""trade"" id",Token,false,TRADE_ID"#,
            r#"trade/party,/trade/party,"",Party,true,"#,
            r#"party@id,/trade/party@id,"",http://www.w3.org/2001/XMLSchema:ID"#,
            r#"party/name,/trade/party/name,"",String,false,PARTY_NAME"#,
            r#"trade/audit,/trade/audit,"",Audit,true,"#,
            r#"audit/user,/trade/audit/user,"",String,false,"#,
        ]
    );
}

#[test]
fn test_unified_attribute_rows() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trade".into()),
        extract: vec!["meta:column".into()],
        attribute_layout: AttributeLayout::Unified,
        ..Default::default()
    };

    let lines = export(&schema, &options);
    assert!(lines.contains(&r#"trade@version,/trade@version,"",http://www.w3.org/2001/XMLSchema:int,false,"#.to_string()));
    assert!(lines.contains(&r#"party@id,/trade/party@id,"",http://www.w3.org/2001/XMLSchema:ID,true,"#.to_string()));
}

#[test]
fn test_skipped_element_drops_its_subtree() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trade".into()),
        skip: vec!["audit".into(), "version".into()],
        ..Default::default()
    };

    let lines = export(&schema, &options);
    assert_eq!(lines[0], "Node,XPath,Annotation,Data Type,Optional");
    assert!(lines.iter().all(|l| !l.contains("audit")));
    assert!(lines.iter().all(|l| !l.contains("@version")));
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_qualified_root_type() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("urn:example:trade:Party".into()),
        ..Default::default()
    };

    let lines = export(&schema, &options);
    assert_eq!(
        &lines[1..],
        &[
            r#"@id,/@id,"",http://www.w3.org/2001/XMLSchema:ID"#.to_string(),
            r#"/name,/name,"",String,false"#.to_string(),
        ]
    );
}

#[test]
fn test_unknown_root_is_reported_before_output() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trad".into()),
        ..Default::default()
    };

    let mut out = Vec::new();
    match extract_xpaths(&schema, &options, &mut out) {
        Err(XsdError::UnresolvedReference {
            kind: ReferenceKind::Root,
            name,
        }) => assert_eq!(name, "trad"),
        other => panic!("Expected unresolved root, got {:?}", other),
    }
    assert!(out.is_empty());

    let suggestions = suggest_roots(&schema, "trad", 3);
    assert!(suggestions.iter().any(|s| s == "trade"));
}

// =============================================================================
// Includes, imports and root selection
// =============================================================================

#[test]
fn test_bundle_is_loaded_with_includes_and_imports() {
    let schema = load("bundle/main.xsd");
    assert_eq!(
        loaded_schemas(&schema),
        vec![
            ("common.xsd".to_string(), "urn:example:main".to_string()),
            ("main.xsd".to_string(), "urn:example:main".to_string()),
            ("reference.xsd".to_string(), "urn:example:reference".to_string()),
        ]
    );
}

#[test]
fn test_root_selected_from_dependency_graph() {
    let schema = load("bundle/main.xsd");
    let mut out = Vec::new();
    let summary = extract_xpaths(&schema, &ExportOptions::default(), &mut out).unwrap();

    assert_eq!(summary.root, "order");
    assert_eq!(summary.records, 3);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[1..],
        [
            r#"order/amount,/order/amount,"",Decimal,false"#,
            r#"amount@currency,/order/amount@currency,"",http://www.w3.org/2001/XMLSchema:string"#,
            r#"order/country,/order/country,"",Token,false"#,
        ]
    );
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn test_recursive_paths_stop_at_repeated_names() {
    let schema = load("recursive.xsd");
    let root = schema.find_root("folder").unwrap();
    let mut records: Vec<Record> = Vec::new();
    XPathEmitter::new(&schema, &mut records)
        .emit_from(root)
        .unwrap();

    let paths: Vec<&str> = records.iter().map(|r| r.xpath.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/folder", "/folder/title", "/folder/file@path"]
    );
}

#[test]
fn test_sibling_paths_survive_stopped_branches() {
    let schema = load("recursive.xsd");
    let root = schema.find_root("folder").unwrap();
    let mut records: Vec<Record> = Vec::new();
    XPathEmitter::new(&schema, &mut records)
        .with_skip(["title"])
        .emit_from(root)
        .unwrap();

    // title is skipped and the folder reference after it stops on the
    // repeated name; file is still one level below the root
    let labels: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.label.as_str(), r.xpath.as_str()))
        .collect();
    assert_eq!(
        labels,
        vec![("/folder", "/folder"), ("file@path", "/folder/file@path")]
    );
}

#[test]
fn test_skipped_sibling_leaves_following_paths_intact() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trade".into()),
        skip: vec!["party".into()],
        ..Default::default()
    };

    let lines = export(&schema, &options);
    assert_eq!(
        lines[lines.len() - 2..],
        [
            r#"trade/audit,/trade/audit,"",Audit,true"#.to_string(),
            r#"audit/user,/trade/audit/user,"",String,false"#.to_string(),
        ]
    );
}

#[test]
fn test_export_is_repeatable() {
    let schema = load("annotated.xsd");
    let options = ExportOptions {
        root: Some("trade".into()),
        ..Default::default()
    };
    assert_eq!(export(&schema, &options), export(&schema, &options));
}

use super::*;

const SAMPLE: &str = r#"{
  "name": "demo-app",
  "version": "0.1.0",
  "dependencies": {
    "left-pad": "1.0.0",
    "react": "16.8.0"
  },
  "devDependencies": {
    "jest": "^29.0.0"
  },
  "peerDependencies": {
    "react": "^17.0.0"
  }
}"#;

#[test]
fn flatten_orders_by_category_then_name() {
    let manifest = Manifest::parse(SAMPLE).expect("parse manifest");
    let records = manifest.flatten();
    let listed = records
        .iter()
        .map(|dep| (dep.name.as_str(), dep.category))
        .collect::<Vec<_>>();
    assert_eq!(
        listed,
        vec![
            ("left-pad", DependencyCategory::Runtime),
            ("react", DependencyCategory::Runtime),
            ("jest", DependencyCategory::Dev),
            ("react", DependencyCategory::Peer),
        ]
    );
}

#[test]
fn set_version_updates_every_declaring_category() {
    let mut manifest = Manifest::parse(SAMPLE).expect("parse manifest");
    assert!(manifest.set_version("react", "17.0.2"));
    assert_eq!(
        manifest.dependencies.get("react").map(String::as_str),
        Some("17.0.2")
    );
    assert_eq!(
        manifest.peer_dependencies.get("react").map(String::as_str),
        Some("17.0.2")
    );
    // Dev bucket never declared react and must stay untouched.
    assert!(!manifest.dev_dependencies.contains_key("react"));
}

#[test]
fn set_version_for_absent_name_is_a_no_op() {
    let mut manifest = Manifest::parse(SAMPLE).expect("parse manifest");
    let before = manifest.clone();
    assert!(!manifest.set_version("lodash", "4.17.21"));
    assert_eq!(manifest, before);
}

#[test]
fn unknown_top_level_fields_survive_a_rewrite() {
    let manifest = Manifest::parse(SAMPLE).expect("parse manifest");
    let rendered = manifest.to_json_string().expect("render manifest");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("round trip");
    assert_eq!(value["name"], "demo-app");
    assert_eq!(value["version"], "0.1.0");
}

#[test]
fn rendered_manifest_uses_two_space_indent_and_trailing_newline() {
    let manifest = Manifest::parse(SAMPLE).expect("parse manifest");
    let rendered = manifest.to_json_string().expect("render manifest");
    assert!(rendered.ends_with('\n'));
    assert!(rendered.contains("\n  \"dependencies\""));
    assert!(rendered.contains("\n    \"left-pad\""));
}

#[test]
fn manifest_without_dependency_sections_flattens_to_nothing() {
    let manifest = Manifest::parse(r#"{"name":"bare"}"#).expect("parse manifest");
    assert!(manifest.flatten().is_empty());
}

#[test]
fn malformed_manifest_is_a_parse_error() {
    assert!(Manifest::parse("{not json").is_err());
    assert!(Manifest::parse(r#"{"dependencies": {"a": 1}}"#).is_err());
}

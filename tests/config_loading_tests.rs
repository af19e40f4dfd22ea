//! Loading and validating settings files

use docrest::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

fn invalid_fields(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::Invalid(errors) => errors.into_iter().map(|e| e.field).collect(),
        other => panic!("expected grammar errors, got {other}"),
    }
}

#[test]
fn test_load_file_with_defaults() {
    let file = write_config(
        r#"
connection: {host: db.internal, port: 27018}
auth: {db: secrets, collection: tokens}
max_results: 5
resources:
  posts:
    type: list
    db: blog
    collection: posts
    schema:
      title: {type: string}
"#,
    );

    let settings = Settings::from_yaml_file(file.path()).unwrap();
    assert_eq!(settings.connection.uri(), "mongodb://db.internal:27018");
    assert_eq!(settings.auth.db, "secrets");
    assert!(settings.auth.enabled);
    assert_eq!(settings.max_results, 5);

    let posts = settings.resource("posts").unwrap();
    assert!(posts.is_list());
    assert_eq!(posts.target, CollectionRef::new("blog", "posts"));
    assert!(!posts.soft_delete);
    assert!(posts.allows(Verb::List));
    assert!(posts.allows(Verb::Delete));
}

#[test]
fn test_missing_file() {
    let err = Settings::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn test_yaml_syntax_error_names_the_file() {
    let file = write_config("resources: [unclosed");
    let err = Settings::from_yaml_file(file.path()).unwrap_err();
    match err {
        ConfigError::ParseError { file: Some(path), .. } => {
            assert_eq!(path, file.path().display().to_string());
        }
        other => panic!("expected a parse error, got {other}"),
    }
}

#[test]
fn test_grammar_violations_are_reported_by_path() {
    let file = write_config(
        r#"
resources:
  x:
    type: list
    db: shop
    collection: items
  things:
    type: simple
    db: shop
    collection: things
    order_by: [name]
    verbs: [list]
    colour: blue
"#,
    );

    let fields = invalid_fields(Settings::from_yaml_file(file.path()).unwrap_err());
    assert!(fields.iter().any(|f| f.starts_with("resources.x")), "got {fields:?}");
    assert!(fields.iter().any(|f| f.contains("order_by")), "got {fields:?}");
    assert!(fields.iter().any(|f| f.contains("verbs")), "got {fields:?}");
    assert!(fields.iter().any(|f| f.contains("colour")), "got {fields:?}");
}

#[test]
fn test_disallowed_enum_value() {
    let err = Settings::from_yaml_str(
        r#"
resources:
  items: {type: bag, db: shop, collection: items}
"#,
    )
    .unwrap_err();
    let fields = invalid_fields(err);
    assert!(fields.iter().any(|f| f.ends_with("type")), "got {fields:?}");
}

#[test]
fn test_schema_required_when_writes_are_allowed() {
    let err = Settings::from_yaml_str(
        r#"
resources:
  items: {type: list, db: shop, collection: items}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got {err}");
}

#[test]
fn test_unresolved_named_schema() {
    let err = Settings::from_yaml_str(
        r#"
resources:
  items:
    type: list
    db: shop
    collection: items
    schema:
      owner: {type: dict, schema: person}
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, ConfigError::UnresolvedSchema { ref name } if name == "person"),
        "got {err}"
    );
}

#[test]
fn test_self_referential_partials_and_schemas() {
    let settings = Settings::from_yaml_str(
        r#"
schemas:
  node:
    label: {type: string}
    children: {type: list, schema: {type: dict, schema: node}}
resources:
  trees:
    type: list
    db: app
    collection: trees
    schema:
      root: {type: dict, schema: node}
    partials:
      root:
        field_name: root
        field_type: scalar
        children:
          children:
            field_name: children
            field_type: list
            children:
              label: {field_name: label, field_type: scalar}
"#,
    )
    .unwrap();
    assert_eq!(settings.schemas.names().count(), 1);
    assert_eq!(settings.resource("trees").unwrap().partials.len(), 1);
}

#[test]
fn test_missing_method_handler_fails_the_build() {
    let settings = Settings::from_yaml_str(
        r#"
auth: {enabled: false}
resources:
  items:
    type: list
    db: shop
    collection: items
    verbs: [list]
    methods:
      export: {type: view, handler: exporter}
"#,
    )
    .unwrap();

    let err = ServerBuilder::new()
        .with_settings(settings)
        .with_store(InMemoryDocumentStore::new())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("exporter"), "got {err}");
}

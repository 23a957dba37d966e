use pretty_assertions::assert_eq;
use refwalk_core::{
    AppError, IndexConfig, LocalFs, MemoryFs, Resolver, ResolvingErrorKind, Rolodex, SpecIndex,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

const API_YAML: &str = r#"openapi: 3.1.0
paths:
  /pets:
    get:
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                $ref: 'schemas/pet.yaml#/Pet'
"#;

const PET_YAML: &str = r#"Pet:
  type: object
  properties:
    tag:
      $ref: '#/Tag'
Tag:
  type: string
"#;

#[test]
fn test_cross_file_resolution() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("schemas")).unwrap();
    fs::write(dir.path().join("api.yaml"), API_YAML).unwrap();
    fs::write(dir.path().join("schemas/pet.yaml"), PET_YAML).unwrap();

    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(dir.path(), Arc::new(LocalFs::new(dir.path()).unwrap()));

    let file = rolodex.open("api.yaml").unwrap();
    let index = file.index(rolodex.index_config()).unwrap();
    let mut index = index.lock();
    let errors = Resolver::new(&mut index).resolve();

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(
        index
            .root()
            .pointer("/paths/~1pets/get/responses/200/content/application~1json/schema"),
        Some(&json!({ "type": "object", "properties": { "tag": { "type": "string" } } }))
    );

    let external: Vec<&str> = index
        .references()
        .iter()
        .filter(|r| r.is_remote)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(external, vec!["Pet", "Tag"]);
}

#[test]
fn test_missing_external_file_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("api.yaml"), API_YAML).unwrap();

    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(dir.path(), Arc::new(LocalFs::new(dir.path()).unwrap()));

    let file = rolodex.open("api.yaml").unwrap();
    let index = file.index(rolodex.index_config()).unwrap();
    let mut index = index.lock();
    let errors = Resolver::new(&mut index).check_for_circular_references();

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].kind,
        ResolvingErrorKind::MissingReference {
            reference: "schemas/pet.yaml#/Pet".into()
        }
    );
}

#[test]
fn test_open_searches_local_roots_in_order() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(first.path().join("a.yaml"), "a: 1").unwrap();
    fs::write(second.path().join("b.yaml"), "b: 2").unwrap();

    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(first.path(), Arc::new(LocalFs::new(first.path()).unwrap()));
    rolodex.add_local_fs(second.path(), Arc::new(LocalFs::new(second.path()).unwrap()));
    assert_eq!(rolodex.local_roots().len(), 2);

    let b = rolodex.open("b.yaml").unwrap();
    assert_eq!(b.document().unwrap().root(), &json!({ "b": 2 }));

    let again = rolodex.open("b.yaml").unwrap();
    assert!(Arc::ptr_eq(&b, &again));

    match rolodex.open("c.yaml").unwrap_err() {
        AppError::FileLookup { location, attempts } => {
            assert_eq!(location, "c.yaml");
            assert!(attempts.len() >= 2, "{:?}", attempts);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_index_the_rolodex() {
    let dir = tempdir().unwrap();
    for name in ["one.yaml", "two.yaml", "three.json"] {
        fs::write(dir.path().join(name), "{\"a\": {\"$ref\": \"#/b\"}, \"b\": {}}").unwrap();
    }

    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(dir.path(), Arc::new(LocalFs::new(dir.path()).unwrap()));
    rolodex.index_the_rolodex().unwrap();

    assert!(rolodex.is_indexed());
    assert!(rolodex.indexing_duration().is_some());
    let indexes = rolodex.indexes();
    assert_eq!(indexes.len(), 3);
    for index in indexes {
        assert_eq!(index.lock().all_sequenced_references().len(), 1);
    }
}

#[test]
fn test_index_the_rolodex_collects_failures() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("good.yaml"), "a: 1").unwrap();
    fs::write(dir.path().join("also-good.yaml"), "b: 2").unwrap();
    fs::write(dir.path().join("bad.yaml"), "a: [unclosed").unwrap();

    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(dir.path(), Arc::new(LocalFs::new(dir.path()).unwrap()));
    let err = rolodex.index_the_rolodex().unwrap_err();

    let leaves = err.leaves();
    assert_eq!(leaves.len(), 1);
    match leaves[0] {
        AppError::FileIndex { path, .. } => assert!(path.ends_with("bad.yaml")),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(rolodex.indexes().len(), 2);
}

#[test]
fn test_remote_documents_from_memory() {
    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_remote_fs(
        "https://example.com/",
        Arc::new(MemoryFs::new().with_file(
            "https://example.com/schemas/pet.yaml",
            "Pet:\n  type: object\n",
        )),
    );

    let config = rolodex
        .index_config()
        .clone()
        .with_spec_absolute_path("https://example.com/api.yaml");
    let mut index = SpecIndex::new(
        json!({ "components": { "schemas": { "Owner": { "properties": {
            "pet": { "$ref": "schemas/pet.yaml#/Pet" }
        } } } } }),
        config,
    );
    let errors = Resolver::new(&mut index).resolve();

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(
        index.root().pointer("/components/schemas/Owner/properties/pet"),
        Some(&json!({ "type": "object" }))
    );
    let pet = &index.references()[index.references().len() - 1];
    assert_eq!(pet.full_definition, "https://example.com/schemas/pet.yaml#/Pet");
    assert_eq!(
        pet.remote_location.as_deref(),
        Some("https://example.com/schemas/pet.yaml")
    );
}

#[test]
fn test_in_memory_document_with_local_memory_root() {
    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(
        "/virtual",
        Arc::new(MemoryFs::new().with_file("common.yaml", "Error:\n  type: string\n")),
    );

    let mut index = SpecIndex::new(
        json!({ "x": { "$ref": "./common.yaml#/Error" } }),
        rolodex.index_config().clone(),
    );
    let errors = Resolver::new(&mut index).resolve();

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(index.root().pointer("/x"), Some(&json!({ "type": "string" })));
}

#[test]
fn test_memory_root_is_bulk_indexed() {
    let rolodex = Rolodex::new(IndexConfig::default());
    rolodex.add_local_fs(
        "/virtual",
        Arc::new(
            MemoryFs::new()
                .with_file("a.yaml", "x:\n  $ref: '#/y'\ny: {}\n")
                .with_file("b.json", "{\"z\": {}}"),
        ),
    );

    rolodex.index_the_rolodex().unwrap();
    assert!(rolodex.is_indexed());
    assert_eq!(rolodex.indexes().len(), 2);
}

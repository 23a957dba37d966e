use pretty_assertions::assert_eq;
use refwalk_core::{
    IndexConfig, Position, Resolver, ResolvingErrorKind, SpecIndex,
};
use serde_json::{json, Value};

fn index(root: Value) -> SpecIndex {
    SpecIndex::new(root, IndexConfig::default())
}

fn schemas(schemas: Value) -> SpecIndex {
    index(json!({ "openapi": "3.1.0", "components": { "schemas": schemas } }))
}

#[test]
fn test_document_without_refs_is_untouched() {
    let root = json!({
        "openapi": "3.1.0",
        "paths": {},
        "components": { "schemas": { "Pet": { "type": "object" } } }
    });
    let mut idx = index(root.clone());
    let errors = Resolver::new(&mut idx).resolve();
    assert!(errors.is_empty());
    assert_eq!(idx.root(), &root);
}

#[test]
fn test_mutual_required_references_are_infinite() {
    let mut idx = schemas(json!({
        "A": { "type": "object", "required": ["b"], "properties": { "b": { "$ref": "#/components/schemas/B" } } },
        "B": { "type": "object", "required": ["a"], "properties": { "a": { "$ref": "#/components/schemas/A" } } }
    }));
    let mut resolver = Resolver::new(&mut idx);
    let errors = resolver.check_for_circular_references();

    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].kind,
        ResolvingErrorKind::InfiniteCircularReference { .. }
    ));
    assert_eq!(resolver.circular_references().len(), 1);
    assert_eq!(resolver.infinite_circular_references().len(), 1);
    assert_eq!(resolver.non_polymorphic_circular_errors().len(), 1);
    assert!(resolver.polymorphic_circular_errors().is_empty());
    assert!(resolver.safe_circular_references().is_empty());

    let cycle = &resolver.circular_references()[0];
    assert_eq!(cycle.journey.len(), 3);
    assert_eq!(cycle.journey.first(), cycle.journey.last());
}

#[test]
fn test_mutual_optional_references_are_safe() {
    let mut idx = schemas(json!({
        "A": { "type": "object", "properties": { "b": { "$ref": "#/components/schemas/B" } } },
        "B": { "type": "object", "properties": { "a": { "$ref": "#/components/schemas/A" } } }
    }));
    let mut resolver = Resolver::new(&mut idx);
    let errors = resolver.check_for_circular_references();

    assert!(errors.is_empty());
    assert_eq!(resolver.circular_references().len(), 1);
    assert!(!resolver.circular_references()[0].is_infinite_loop);
}

#[test]
fn test_infinite_cycle_stays_unresolved() {
    let mut idx = schemas(json!({
        "A": { "type": "object", "required": ["b"], "properties": { "b": { "$ref": "#/components/schemas/B" } } },
        "B": { "type": "object", "required": ["a"], "properties": { "a": { "$ref": "#/components/schemas/A" } } }
    }));
    let errors = Resolver::new(&mut idx).resolve();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        idx.root().pointer("/components/schemas/A/properties/b"),
        Some(&json!({ "$ref": "#/components/schemas/B" }))
    );
}

fn tree_with_array_children() -> SpecIndex {
    schemas(json!({
        "Tree": {
            "type": "object",
            "properties": {
                "children": { "type": "array", "items": { "$ref": "#/components/schemas/Tree" } }
            }
        }
    }))
}

#[test]
fn test_array_cycle_is_classified() {
    let mut idx = tree_with_array_children();
    let mut resolver = Resolver::new(&mut idx);
    resolver.check_for_circular_references();

    assert_eq!(resolver.circular_references().len(), 1);
    let cycle = &resolver.circular_references()[0];
    assert!(cycle.is_array_result);
    assert!(!cycle.is_polymorphic_result);
    assert!(!cycle.is_infinite_loop);
    assert_eq!(cycle.journey_path, "Tree -> Tree");
}

#[test]
fn test_ignored_array_cycle_is_set_aside() {
    let mut idx = tree_with_array_children();
    let mut resolver = Resolver::new(&mut idx);
    resolver.ignore_array_circular_references();
    let errors = resolver.check_for_circular_references();

    assert!(errors.is_empty());
    assert!(resolver.circular_references().is_empty());
    assert_eq!(resolver.ignored_array_references().len(), 1);
}

fn polymorphic_tree(keyword: &str) -> SpecIndex {
    schemas(json!({
        "Tree": {
            "type": "object",
            "properties": {
                "child": {
                    keyword: [
                        { "$ref": "#/components/schemas/Tree" },
                        { "type": "string" }
                    ]
                }
            }
        }
    }))
}

#[test]
fn test_polymorphic_cycles_are_classified() {
    for keyword in ["oneOf", "anyOf", "allOf"] {
        let mut idx = polymorphic_tree(keyword);
        let mut resolver = Resolver::new(&mut idx);
        resolver.check_for_circular_references();

        assert_eq!(resolver.circular_references().len(), 1, "{}", keyword);
        let cycle = &resolver.circular_references()[0];
        assert!(cycle.is_polymorphic_result);
        assert_eq!(cycle.polymorphic_type.as_deref(), Some(keyword));
        assert!(!cycle.is_infinite_loop);
        assert!(resolver.polymorphic_circular_errors().is_empty());
    }
}

#[test]
fn test_ignored_polymorphic_cycle_is_set_aside() {
    let mut idx = polymorphic_tree("oneOf");
    let mut resolver = Resolver::new(&mut idx);
    resolver.ignore_polymorphic_circular_references();
    resolver.check_for_circular_references();

    assert!(resolver.circular_references().is_empty());
    assert_eq!(resolver.ignored_poly_references().len(), 1);
}

#[test]
fn test_polymorphic_branch_is_resolved() {
    let mut idx = schemas(json!({
        "Animal": { "type": "object", "properties": { "name": { "type": "string" } } },
        "Dog": { "allOf": [ { "$ref": "#/components/schemas/Animal" }, { "type": "object" } ] }
    }));
    let errors = Resolver::new(&mut idx).resolve();
    assert!(errors.is_empty());
    assert_eq!(
        idx.root().pointer("/components/schemas/Dog/allOf/0"),
        Some(&json!({ "type": "object", "properties": { "name": { "type": "string" } } }))
    );
}

const MISSING_YAML: &str = r#"openapi: 3.1.0
paths:
  /pets:
    get:
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Nope'
components:
  schemas:
    Pet:
      type: object
      properties:
        owner:
          $ref: '#/components/schemas/Owner'
"#;

#[test]
fn test_missing_references_report_positions() {
    let mut idx = SpecIndex::from_source(MISSING_YAML, IndexConfig::default()).unwrap();
    let errors = Resolver::new(&mut idx).check_for_circular_references();

    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors[0].kind,
        ResolvingErrorKind::MissingReference {
            reference: "#/components/schemas/Owner".into()
        }
    );
    assert_eq!(errors[0].position, Some(Position { line: 18, column: 11 }));
    assert_eq!(
        errors[1].to_string(),
        "cannot resolve reference `#/components/schemas/Nope`, it's missing: $.components.schemas.Nope [11:17]"
    );
}

#[test]
fn test_resolve_is_idempotent() {
    let root = json!({
        "paths": { "/pets": { "get": { "schema": { "$ref": "#/components/schemas/Pet" } } } },
        "components": { "schemas": {
            "Pet": { "type": "object", "properties": { "tag": { "$ref": "#/components/schemas/Tag" } } },
            "Tag": { "type": "string" },
            "Node": { "type": "object", "properties": { "next": { "$ref": "#/components/schemas/Node" } } }
        } }
    });

    let mut first = index(root);
    assert!(Resolver::new(&mut first).resolve().is_empty());
    let once = first.into_root();

    let mut second = index(once.clone());
    assert!(Resolver::new(&mut second).resolve().is_empty());
    assert_eq!(second.root(), &once);
    assert_eq!(
        once.pointer("/components/schemas/Node/properties/next"),
        Some(&json!({ "$ref": "#/components/schemas/Node" }))
    );
}

#[test]
fn test_check_does_not_modify_document() {
    let root = json!({
        "paths": { "/pets": { "get": { "schema": { "$ref": "#/components/schemas/Pet" } } } },
        "components": { "schemas": { "Pet": { "type": "object" } } }
    });
    let mut idx = index(root.clone());
    Resolver::new(&mut idx).check_for_circular_references();
    assert_eq!(idx.root(), &root);
}

#[test]
fn test_long_chains_are_cut_off() {
    let mut chain = serde_json::Map::new();
    for i in 0..150 {
        chain.insert(
            format!("S{}", i),
            json!({ "properties": { "next": { "$ref": format!("#/components/schemas/S{}", i + 1) } } }),
        );
    }
    chain.insert("S150".to_string(), json!({ "type": "string" }));

    let mut idx = schemas(Value::Object(chain));
    let mut resolver = Resolver::new(&mut idx);
    let errors = resolver.check_for_circular_references();
    assert!(errors.is_empty());
    assert!(resolver.circular_references().is_empty());
    assert!(resolver.journeys_taken() > 0);
}

#[test]
fn test_required_loop_elsewhere_does_not_make_start_infinite() {
    let mut idx = schemas(json!({
        "A": {
            "type": "object",
            "required": ["b"],
            "properties": {
                "parent": { "$ref": "#/components/schemas/A" },
                "b": { "$ref": "#/components/schemas/B" }
            }
        },
        "B": { "type": "object", "required": ["c"], "properties": { "c": { "$ref": "#/components/schemas/C" } } },
        "C": { "type": "object", "required": ["b"], "properties": { "b": { "$ref": "#/components/schemas/B" } } }
    }));
    let mut resolver = Resolver::new(&mut idx);
    let errors = resolver.check_for_circular_references();

    assert_eq!(errors.len(), 1);
    assert_eq!(resolver.infinite_circular_references().len(), 1);
    assert_eq!(resolver.safe_circular_references().len(), 1);
    assert_eq!(resolver.safe_circular_references()[0].start_name, "A");
}

#[test]
fn test_second_resolve_on_same_index_changes_nothing() {
    let mut idx = schemas(json!({
        "Pet": { "type": "object", "properties": {
            "tag": { "$ref": "#/components/schemas/Tag" },
            "parent": { "$ref": "#/components/schemas/Pet" }
        } },
        "Tag": { "type": "string" },
        "A": { "type": "object", "required": ["b"], "properties": { "b": { "$ref": "#/components/schemas/B" } } },
        "B": { "type": "object", "required": ["a"], "properties": { "a": { "$ref": "#/components/schemas/A" } } }
    }));

    let first = Resolver::new(&mut idx).resolve();
    assert_eq!(first.len(), 1);
    let resolved = idx.root().clone();

    let mut again = Resolver::new(&mut idx);
    let errors = again.resolve();
    assert!(errors.is_empty());
    assert!(again.circular_references().is_empty());
    assert!(again.infinite_circular_references().is_empty());
    assert_eq!(idx.root(), &resolved);
}

#[test]
fn test_cycle_through_alternate_spelling_is_one_step() {
    let mut idx = schemas(json!({
        "Node": { "type": "object", "properties": { "next": { "$ref": "#/components/schemas/No%64e" } } }
    }));
    let mut resolver = Resolver::new(&mut idx);
    let errors = resolver.check_for_circular_references();

    assert!(errors.is_empty());
    assert_eq!(resolver.circular_references().len(), 1);
    let cycle = &resolver.circular_references()[0];
    assert_eq!(cycle.journey_path, "Node -> Node");
    assert_eq!(cycle.journey.len(), 2);
}

#![deny(missing_docs)]

//! # References
//!
//! Arena entries for `$ref` targets, and the `$ref` sites that point at them.

use crate::document::Position;
use crate::index::locator::Locator;
use crate::index::ref_utils::name_from_definition;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Stable key of a [`Reference`] inside its index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RefId(pub(crate) usize);

impl RefId {
    /// Position of the reference in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One `$ref` target, owned by the index that discovered it.
///
/// The traversal flags (`seen`, `resolved`, `circular`) are only ever
/// flipped by a [`Resolver`](crate::Resolver) holding the index mutably.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Document-local definition, e.g. `#/components/schemas/Pet`.
    pub definition: String,
    /// Canonical location, e.g. `/specs/api.yaml#/components/schemas/Pet`.
    pub full_definition: String,
    /// Short name (last pointer segment).
    pub name: String,
    /// Canonical document the target lives in (`""` for an in-memory document).
    pub document: String,
    /// JSON Pointer of the target inside its document.
    pub pointer: String,
    /// Snapshot of the target content taken when the reference was located.
    pub node: Value,
    /// Document the target was fetched from, when it lives outside the index's document.
    pub remote_location: Option<String>,
    /// Whether the target lives outside the index's document.
    pub is_remote: bool,
    /// Visited by a resolver.
    pub seen: bool,
    /// Fully processed by a resolver.
    pub resolved: bool,
    /// Part of a detected cycle.
    pub circular: bool,
    /// Canonical locations reached through required properties, mapped to the
    /// property names that reach them.
    pub required_ref_properties: IndexMap<String, Vec<String>>,
    /// Schema type of the container holding the last `$ref` that led here
    /// (`Some("array")` for `items` of an array schema).
    pub parent_node_schema_type: Option<String>,
    /// Source position of the first `$ref` site that pointed here, if known.
    pub position: Option<Position>,
    pub(crate) resolved_node: Option<Value>,
}

impl Reference {
    pub(crate) fn new(
        locator: &Locator,
        document: String,
        pointer: String,
        node: Value,
        is_remote: bool,
    ) -> Self {
        let full_definition = locator.to_string();
        let required_ref_properties = required_ref_properties(&node, locator);
        Self {
            definition: locator.definition(),
            name: name_from_definition(&full_definition),
            full_definition,
            remote_location: is_remote.then(|| document.clone()),
            document,
            pointer,
            node,
            is_remote,
            seen: false,
            resolved: false,
            circular: false,
            required_ref_properties,
            parent_node_schema_type: None,
            position: None,
            resolved_node: None,
        }
    }

    /// The resolved content when a resolving run has completed this reference.
    pub fn resolved_node(&self) -> Option<&Value> {
        self.resolved_node.as_ref()
    }

    /// The resolved content if present, else the original snapshot.
    pub fn content(&self) -> &Value {
        self.resolved_node.as_ref().unwrap_or(&self.node)
    }
}

/// One `$ref` occurrence in an index's own document.
#[derive(Debug, Clone, PartialEq)]
pub struct RefSite {
    /// The `$ref` value as written.
    pub raw: String,
    /// Document-local definition of the target.
    pub definition: String,
    /// Canonical location of the target.
    pub full_definition: String,
    /// JSON Pointer of the map holding the `$ref` key.
    pub pointer: String,
    /// Source position of the `$ref` key, if known.
    pub position: Option<Position>,
    /// `Some("array")` when the site is the `items` of an array schema.
    pub parent_node_schema_type: Option<String>,
}

/// Returns `Some("array")` when `parent` is a schema whose `type` is (or includes) `array`.
pub(crate) fn parent_schema_type(parent: Option<&Value>) -> Option<String> {
    let schema_type = parent?.get("type")?;
    let is_array = match schema_type {
        Value::String(t) => t == "array",
        Value::Array(types) => types.iter().any(|t| t.as_str() == Some("array")),
        _ => false,
    };
    is_array.then(|| "array".to_string())
}

/// Collects the targets of required properties whose schema is a direct `$ref`.
///
/// Array items and optional properties are escapes from recursion and are
/// deliberately left out.
fn required_ref_properties(node: &Value, location: &Locator) -> IndexMap<String, Vec<String>> {
    let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
    let Some(required) = node.get("required").and_then(Value::as_array) else {
        return out;
    };
    let Some(properties) = node.get("properties").and_then(Value::as_object) else {
        return out;
    };

    for name in required.iter().filter_map(Value::as_str) {
        let target = properties
            .get(name)
            .and_then(|p| p.get("$ref"))
            .and_then(Value::as_str);
        if let Some(target) = target {
            let full = Locator::parse(target).resolve(location).to_string();
            out.entry(full).or_default().push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_ref_properties_only_direct_required_refs() {
        let node = json!({
            "type": "object",
            "required": ["owner", "tags", "note"],
            "properties": {
                "owner": { "$ref": "#/components/schemas/User" },
                "tags": { "type": "array", "items": { "$ref": "#/components/schemas/Tag" } },
                "note": { "type": "string" },
                "parent": { "$ref": "#/components/schemas/Pet" }
            }
        });
        let loc = Locator::parse("/specs/api.yaml#/components/schemas/Pet");
        let reference = Reference::new(
            &loc,
            "/specs/api.yaml".into(),
            "/components/schemas/Pet".into(),
            node,
            false,
        );

        assert_eq!(reference.name, "Pet");
        assert_eq!(reference.definition, "#/components/schemas/Pet");
        let keys: Vec<&String> = reference.required_ref_properties.keys().collect();
        assert_eq!(keys, vec!["/specs/api.yaml#/components/schemas/User"]);
        assert_eq!(
            reference.required_ref_properties[0],
            vec!["owner".to_string()]
        );
    }

    #[test]
    fn test_parent_schema_type() {
        assert_eq!(
            parent_schema_type(Some(&json!({"type": "array"}))),
            Some("array".to_string())
        );
        assert_eq!(
            parent_schema_type(Some(&json!({"type": ["array", "null"]}))),
            Some("array".to_string())
        );
        assert_eq!(parent_schema_type(Some(&json!({"type": "object"}))), None);
        assert_eq!(parent_schema_type(None), None);
    }

    #[test]
    fn test_remote_reference_records_location() {
        let loc = Locator::parse("https://example.com/pet.yaml#/Pet");
        let reference = Reference::new(
            &loc,
            "https://example.com/pet.yaml".into(),
            "/Pet".into(),
            json!({}),
            true,
        );
        assert!(reference.is_remote);
        assert_eq!(
            reference.remote_location.as_deref(),
            Some("https://example.com/pet.yaml")
        );
        assert_eq!(reference.content(), &json!({}));
    }
}

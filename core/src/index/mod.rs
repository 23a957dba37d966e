#![deny(missing_docs)]

//! # Spec Index
//!
//! - **locator**: Parsing and canonicalization of `$ref` values.
//! - **reference**: Arena entries for `$ref` targets and sites.
//! - **resolver**: Cycle detection and in-place resolution.
//!
//! A [`SpecIndex`] owns one parsed document and an arena of every
//! [`Reference`] discovered in it, keyed by canonical full definition.
//! Targets in other documents are located lazily through the [`Rolodex`]
//! the index was configured with.

pub mod locator;
pub(crate) mod ref_utils;
pub mod reference;
pub mod resolver;

use crate::document::{collect_ref_sites, parse_document, ParsedDocument, Position};
use crate::error::AppResult;
use crate::rolodex::Rolodex;
use indexmap::IndexMap;
use locator::Locator;
use ref_utils::{escape_pointer_segment, normalize_fragment_pointer};
use reference::{parent_schema_type, RefId, RefSite, Reference};
use resolver::CircularReferenceResult;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Sections holding named, reusable schemas (OpenAPI 3 and Swagger 2).
const SCHEMA_SECTIONS: [&str; 2] = ["/components/schemas", "/definitions"];

/// Configuration handed to every index built from the same rolodex.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Canonical location of the indexed document. `None` for an in-memory document.
    pub spec_absolute_path: Option<String>,
    /// Back-reference to the rolodex that serves documents outside this one.
    pub rolodex: Option<Weak<Rolodex>>,
}

impl IndexConfig {
    /// Returns a copy of this configuration describing the document at `path`.
    pub fn with_spec_absolute_path(mut self, path: impl Into<String>) -> Self {
        self.spec_absolute_path = Some(path.into());
        self
    }

    /// The rolodex, if one was configured and is still alive.
    pub fn rolodex(&self) -> Option<Arc<Rolodex>> {
        self.rolodex.as_ref().and_then(Weak::upgrade)
    }
}

/// An index of one document and every reference target reachable from it.
#[derive(Debug)]
pub struct SpecIndex {
    config: IndexConfig,
    location: Locator,
    doc_key: String,
    root: Value,
    positions: HashMap<String, Position>,
    external_positions: HashMap<String, HashMap<String, Position>>,
    references: Vec<Reference>,
    by_full_definition: HashMap<String, RefId>,
    mapped: IndexMap<String, RefId>,
    component_schemas: IndexMap<String, RefId>,
    sites: Vec<RefSite>,
    circular_references: Vec<CircularReferenceResult>,
    externals_mapped: bool,
}

impl SpecIndex {
    /// Indexes an already built tree. No source positions are known.
    pub fn new(root: Value, config: IndexConfig) -> Self {
        Self::from_document(ParsedDocument::from_value(root), config)
    }

    /// Parses YAML or JSON text and indexes it.
    pub fn from_source(source: &str, config: IndexConfig) -> AppResult<Self> {
        let document = parse_document(source.as_bytes())?;
        Ok(Self::from_document(document, config))
    }

    /// Indexes a parsed document.
    pub fn from_document(document: ParsedDocument, config: IndexConfig) -> Self {
        let location = config
            .spec_absolute_path
            .as_deref()
            .map(|path| Locator::parse(path).with_fragment(None))
            .unwrap_or_else(Locator::in_memory);
        let doc_key = location.document();
        let (root, positions) = document.into_parts();

        let mut index = Self {
            config,
            location,
            doc_key,
            root,
            positions,
            external_positions: HashMap::new(),
            references: Vec::new(),
            by_full_definition: HashMap::new(),
            mapped: IndexMap::new(),
            component_schemas: IndexMap::new(),
            sites: Vec::new(),
            circular_references: Vec::new(),
            externals_mapped: false,
        };
        index.discover_sites();
        index.discover_component_schemas();

        tracing::debug!(
            document = %index.location,
            sites = index.sites.len(),
            references = index.references.len(),
            schemas = index.component_schemas.len(),
            "document indexed"
        );
        index
    }

    fn discover_sites(&mut self) {
        let found: Vec<(String, String, Option<String>)> = collect_ref_sites(&self.root)
            .into_iter()
            .map(|site| {
                (
                    site.pointer,
                    site.value.to_string(),
                    parent_schema_type(site.parent),
                )
            })
            .collect();

        for (pointer, raw, parent_type) in found {
            let locator = Locator::parse(&raw).resolve(&self.location);
            let full_definition = locator.to_string();
            let position = self.positions.get(&pointer).copied();

            if locator.document() == self.doc_key {
                if let Some(id) = self.locate_local(&locator) {
                    if !self.mapped.values().any(|mapped| *mapped == id) {
                        self.mapped.insert(full_definition.clone(), id);
                    }
                    let reference = &mut self.references[id.0];
                    if reference.position.is_none() {
                        reference.position = position;
                    }
                }
            }

            self.sites.push(RefSite {
                raw,
                definition: locator.definition(),
                full_definition,
                pointer,
                position,
                parent_node_schema_type: parent_type,
            });
        }
    }

    fn discover_component_schemas(&mut self) {
        for section in SCHEMA_SECTIONS {
            let names: Vec<String> = match self.root.pointer(section) {
                Some(Value::Object(map)) => map.keys().cloned().collect(),
                _ => continue,
            };
            for name in names {
                let fragment = format!("{}/{}", section, escape_pointer_segment(&name));
                let locator = self.location.with_fragment(Some(fragment));
                if let Some(id) = self.locate_local(&locator) {
                    self.component_schemas.insert(locator.to_string(), id);
                }
            }
        }
    }

    /// Locates a target inside this index's own document.
    ///
    /// Targets are keyed by their normalized pointer; the spelling asked for
    /// is kept as an alias.
    fn locate_local(&mut self, locator: &Locator) -> Option<RefId> {
        let requested = locator.to_string();
        if let Some(id) = self.by_full_definition.get(&requested) {
            return Some(*id);
        }

        let pointer = normalize_fragment_pointer(locator.fragment().unwrap_or(""));
        let canonical = self
            .location
            .with_fragment(locator.fragment().map(|_| pointer.clone()));
        let canonical_definition = canonical.to_string();

        let id = match self.by_full_definition.get(&canonical_definition).copied() {
            Some(id) => id,
            None => {
                let node = self.root.pointer(&pointer)?.clone();
                let document = self.doc_key.clone();
                self.insert_reference(&canonical, &canonical_definition, document, pointer, node, false)
            }
        };
        self.by_full_definition.insert(requested, id);
        Some(id)
    }

    /// Locates a target in another document, served by the rolodex.
    fn locate_external(&mut self, locator: &Locator) -> Option<RefId> {
        let requested = locator.to_string();
        let rolodex = self.config.rolodex()?;
        let document = locator.document();

        let file = match rolodex.open(&document) {
            Ok(file) => file,
            Err(err) => {
                tracing::debug!(document = %document, error = %err, "external document unavailable");
                return None;
            }
        };
        let parsed = match file.document() {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(document = %file.full_path(), error = %err, "unable to parse external document");
                return None;
            }
        };

        let pointer = normalize_fragment_pointer(locator.fragment().unwrap_or(""));
        let node = parsed.root().pointer(&pointer)?.clone();

        // Targets are keyed by the location the file was actually served from.
        let canonical = Locator::parse(file.full_path())
            .with_fragment(locator.fragment().map(|_| pointer.clone()));
        let canonical_definition = canonical.to_string();
        if let Some(id) = self.by_full_definition.get(&canonical_definition).copied() {
            self.by_full_definition.insert(requested, id);
            return Some(id);
        }

        let served_from = canonical.document();
        self.external_positions
            .entry(served_from.clone())
            .or_insert_with(|| parsed.positions().clone());
        let id = self.insert_reference(&canonical, &canonical_definition, served_from, pointer, node, true);
        self.by_full_definition.insert(requested, id);
        Some(id)
    }

    fn insert_reference(
        &mut self,
        locator: &Locator,
        full_definition: &str,
        document: String,
        pointer: String,
        node: Value,
        is_remote: bool,
    ) -> RefId {
        let id = RefId(self.references.len());
        self.references
            .push(Reference::new(locator, document, pointer, node, is_remote));
        self.by_full_definition.insert(full_definition.to_string(), id);
        id
    }

    /// Locates every external target referenced from this document.
    ///
    /// Idempotent. Targets no filesystem can serve are left unmapped and are
    /// reported as missing by a resolver.
    pub fn map_external_references(&mut self) {
        if self.externals_mapped {
            return;
        }
        self.externals_mapped = true;

        let mut mapped = IndexMap::new();
        let mut ids = HashSet::new();
        for i in 0..self.sites.len() {
            let full_definition = self.sites[i].full_definition.clone();
            if let Some(id) = self.search_index_for_reference(&full_definition) {
                if ids.insert(id) {
                    mapped.insert(full_definition, id);
                }
            }
        }
        self.mapped = mapped;
    }

    /// Finds (or locates and records) the reference for a canonical full definition.
    ///
    /// Looks in the arena first, then in this document, then asks the rolodex.
    pub fn search_index_for_reference(&mut self, full_definition: &str) -> Option<RefId> {
        if let Some(id) = self.by_full_definition.get(full_definition) {
            return Some(*id);
        }
        let locator = Locator::parse(full_definition);
        if locator.document() == self.doc_key {
            self.locate_local(&locator)
        } else {
            self.locate_external(&locator)
        }
    }

    /// Same as [`search_index_for_reference`](Self::search_index_for_reference), keyed by an existing reference.
    pub fn search_index_for_reference_by_reference(&mut self, reference: &Reference) -> Option<RefId> {
        self.search_index_for_reference(&reference.full_definition)
    }

    /// The configuration this index was built with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Canonical location of the indexed document.
    pub fn location(&self) -> &Locator {
        &self.location
    }

    /// Whether `document` (a canonical document string) is the indexed document.
    pub fn is_own_document(&self, document: &str) -> bool {
        document == self.doc_key
    }

    /// The document tree. Mutated in place by a resolving run.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Consumes the index, returning its document tree.
    pub fn into_root(self) -> Value {
        self.root
    }

    /// The reference stored under `id`.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this index.
    pub fn reference(&self, id: RefId) -> &Reference {
        &self.references[id.0]
    }

    pub(crate) fn reference_mut(&mut self, id: RefId) -> &mut Reference {
        &mut self.references[id.0]
    }

    /// Every reference located so far, in arena order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Targets of the `$ref` sites of this document, keyed by canonical full definition.
    pub fn mapped_references(&self) -> &IndexMap<String, RefId> {
        &self.mapped
    }

    /// Targets of the `$ref` sites of this document, in discovery order.
    pub fn mapped_references_sequenced(&self) -> Vec<RefId> {
        self.mapped.values().copied().collect()
    }

    /// Every named schema under `components/schemas` or `definitions`.
    pub fn all_component_schemas(&self) -> &IndexMap<String, RefId> {
        &self.component_schemas
    }

    /// Every `$ref` site of this document, in document order.
    pub fn all_sequenced_references(&self) -> &[RefSite] {
        &self.sites
    }

    /// Cycles recorded by the last circular-reference check.
    pub fn circular_references(&self) -> &[CircularReferenceResult] {
        &self.circular_references
    }

    /// Records the cycles found by a circular-reference check.
    pub fn set_circular_references(&mut self, results: Vec<CircularReferenceResult>) {
        self.circular_references = results;
    }

    /// Source position of the `$ref` key of the map at `pointer` in `document`.
    pub fn position_of(&self, document: &str, pointer: &str) -> Option<Position> {
        if document == self.doc_key {
            self.positions.get(pointer).copied()
        } else {
            self.external_positions.get(document)?.get(pointer).copied()
        }
    }

    /// Replaces the node at `pointer` in this document. Returns `false` when
    /// nothing lives at `pointer`.
    pub(crate) fn splice(&mut self, pointer: &str, content: Value) -> bool {
        match self.root.pointer_mut(pointer) {
            Some(slot) => {
                *slot = content;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> Value {
        json!({
            "openapi": "3.1.0",
            "paths": {
                "/pets": {
                    "get": {
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Pet" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": { "tag": { "$ref": "#/components/schemas/Tag" } }
                    },
                    "Tag": { "type": "string" },
                    "Unused": { "type": "integer" }
                }
            }
        })
    }

    #[test]
    fn test_sites_and_mapped_references() {
        let index = SpecIndex::new(petstore(), IndexConfig::default());

        let sites = index.all_sequenced_references();
        assert_eq!(sites.len(), 2);
        assert_eq!(
            sites[0].pointer,
            "/paths/~1pets/get/responses/200/content/application~1json/schema"
        );
        assert_eq!(sites[0].full_definition, "#/components/schemas/Pet");
        assert_eq!(sites[1].pointer, "/components/schemas/Pet/properties/tag");

        let mapped: Vec<&str> = index
            .mapped_references_sequenced()
            .into_iter()
            .map(|id| index.reference(id).name.as_str())
            .collect();
        assert_eq!(mapped, vec!["Pet", "Tag"]);
    }

    #[test]
    fn test_component_schemas_include_unreferenced() {
        let index = SpecIndex::new(petstore(), IndexConfig::default());
        let names: Vec<&String> = index.all_component_schemas().keys().collect();
        assert_eq!(
            names,
            vec![
                "#/components/schemas/Pet",
                "#/components/schemas/Tag",
                "#/components/schemas/Unused"
            ]
        );
    }

    #[test]
    fn test_search_is_stable_across_spellings() {
        let mut index = SpecIndex::new(
            json!({ "paths": { "/pets/{id}": { "get": {} } } }),
            IndexConfig::default(),
        );
        let a = index.search_index_for_reference("#/paths/~1pets~1{id}/get");
        let b = index.search_index_for_reference("#/paths/~1pets~1%7Bid%7D/get");
        assert!(a.is_some());
        assert_eq!(a, b);
        assert!(index.search_index_for_reference("#/paths/~1cats").is_none());
    }

    #[test]
    fn test_alternate_spelling_shares_one_reference() {
        let index = SpecIndex::new(
            json!({ "components": { "schemas": {
                "Node": { "properties": { "next": { "$ref": "#/components/schemas/No%64e" } } }
            } } }),
            IndexConfig::default(),
        );
        let definitions: Vec<&str> = index
            .references()
            .iter()
            .map(|r| r.full_definition.as_str())
            .collect();
        assert_eq!(definitions, vec!["#/components/schemas/Node"]);
        assert_eq!(index.mapped_references_sequenced().len(), 1);
        assert_eq!(
            index.all_component_schemas().values().copied().collect::<Vec<_>>(),
            index.mapped_references_sequenced()
        );
    }

    #[test]
    fn test_file_backed_index_uses_absolute_definitions() {
        let config = IndexConfig::default().with_spec_absolute_path("/specs/api.yaml");
        let index = SpecIndex::new(petstore(), config);
        assert!(index.is_own_document("/specs/api.yaml"));
        assert_eq!(
            index.all_sequenced_references()[0].full_definition,
            "/specs/api.yaml#/components/schemas/Pet"
        );
    }

    #[test]
    fn test_external_without_rolodex_is_unmapped() {
        let mut index = SpecIndex::new(
            json!({ "a": { "$ref": "other.yaml#/Thing" } }),
            IndexConfig::default(),
        );
        index.map_external_references();
        assert!(index.mapped_references().is_empty());
        assert_eq!(index.all_sequenced_references().len(), 1);
    }

    #[test]
    fn test_positions_from_source() {
        let yaml = "paths: {}\ncomponents:\n  schemas:\n    A:\n      $ref: '#/components/schemas/B'\n    B:\n      type: string\n";
        let index = SpecIndex::from_source(yaml, IndexConfig::default()).unwrap();
        let site = &index.all_sequenced_references()[0];
        assert_eq!(site.position, Some(Position { line: 5, column: 7 }));
        let target = index.mapped_references_sequenced()[0];
        assert_eq!(index.reference(target).position, Some(Position { line: 5, column: 7 }));
    }
}

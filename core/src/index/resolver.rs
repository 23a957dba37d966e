#![deny(missing_docs)]

//! # Resolver
//!
//! Walks every reference of a [`SpecIndex`], classifying cycles and, when
//! asked to, splicing resolved content into the document in place.
//!
//! A cycle is:
//! - **infinite** when the start can be reached again through required
//!   properties alone (no valid finite instance exists);
//! - **array** when the closing `$ref` is the `items` of an array schema;
//! - **polymorphic** when the closing `$ref` is an `allOf` / `oneOf` /
//!   `anyOf` branch.
//!
//! Array and polymorphic cycles can be routed to separate "ignored" lists.
//! Problems are returned as values so one pass reports all of them.

use crate::document::Position;
use crate::index::locator::Locator;
use crate::index::ref_utils::{escape_pointer_segment, friendly_path};
use crate::index::reference::{parent_schema_type, RefId};
use crate::index::SpecIndex;
use derive_more::Display;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Journeys longer than this are not followed any deeper.
pub const MAX_JOURNEY_LENGTH: usize = 100;

const POLYMORPHIC_KEYWORDS: [&str; 3] = ["allOf", "oneOf", "anyOf"];

/// A detected reference cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircularReferenceResult {
    /// The references walked, ending with the one that closes the loop.
    pub journey: Vec<RefId>,
    /// Reference names along the journey, joined with ` -> `.
    pub journey_path: String,
    /// The reference the cycle returns to.
    pub start: RefId,
    /// Name of the start reference.
    pub start_name: String,
    /// Canonical full definition of the start reference.
    pub start_definition: String,
    /// Index in the journey where the loop begins.
    pub loop_index: usize,
    /// The reference at which the loop closes.
    pub loop_point: RefId,
    /// No finite instance can satisfy the cycle.
    pub is_infinite_loop: bool,
    /// The loop closes through `allOf` / `oneOf` / `anyOf`.
    pub is_polymorphic_result: bool,
    /// The loop closes through array items.
    pub is_array_result: bool,
    /// The polymorphic keyword, for polymorphic cycles.
    pub polymorphic_type: Option<String>,
    /// Source position of the `$ref` that closes the loop, if known.
    pub position: Option<Position>,
}

impl CircularReferenceResult {
    /// Human readable path of the cycle, e.g. `A -> B -> A`.
    pub fn generate_journey_path(&self) -> &str {
        &self.journey_path
    }
}

/// What went wrong with a reference.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ResolvingErrorKind {
    /// The target of a `$ref` could not be located.
    #[display("cannot resolve reference `{reference}`, it's missing")]
    MissingReference {
        /// The `$ref` value as written.
        reference: String,
    },
    /// A cycle no finite instance can satisfy.
    #[display("infinite circular reference detected: {start}")]
    InfiniteCircularReference {
        /// Name of the reference the cycle returns to.
        start: String,
    },
}

/// A problem found while walking references.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvingError {
    /// The kind of problem.
    pub kind: ResolvingErrorKind,
    /// Source position of the offending `$ref`, if known.
    pub position: Option<Position>,
    /// Friendly path of the target, or the cycle's journey path.
    pub path: String,
    /// The cycle, for infinite circular references.
    pub circular_reference: Option<CircularReferenceResult>,
}

impl fmt::Display for ResolvingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{}: {} [{}:{}]", self.kind, self.path, pos.line, pos.column),
            None => write!(f, "{}: {} [?:?]", self.kind, self.path),
        }
    }
}

impl std::error::Error for ResolvingError {}

/// A `$ref` found inside the node being visited.
#[derive(Debug)]
struct Relative {
    target: RefId,
    /// Pointer of the `$ref` map, relative to the visited node.
    pointer: String,
    parent_schema_type: Option<String>,
    position: Option<Position>,
}

/// Per-visit walking context.
struct Walk<'j> {
    reference: RefId,
    referrer: Locator,
    journey: &'j [RefId],
    resolve: bool,
}

/// Resolves (or only checks) the references of one index.
///
/// The resolver borrows the index mutably for its whole lifetime: traversal
/// flags and resolved content are written straight into the index.
pub struct Resolver<'a> {
    index: &'a mut SpecIndex,
    resolving_errors: Vec<ResolvingError>,
    circular_references: Vec<CircularReferenceResult>,
    ignored_poly_references: Vec<CircularReferenceResult>,
    ignored_array_references: Vec<CircularReferenceResult>,
    reported_missing: HashSet<String>,
    ignore_poly: bool,
    ignore_array: bool,
    references_visited: usize,
    indexes_visited: usize,
    journeys_taken: usize,
    relatives_seen: usize,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `index`.
    pub fn new(index: &'a mut SpecIndex) -> Self {
        Self {
            index,
            resolving_errors: Vec::new(),
            circular_references: Vec::new(),
            ignored_poly_references: Vec::new(),
            ignored_array_references: Vec::new(),
            reported_missing: HashSet::new(),
            ignore_poly: false,
            ignore_array: false,
            references_visited: 0,
            indexes_visited: 0,
            journeys_taken: 0,
            relatives_seen: 0,
        }
    }

    /// Creates a resolver, or `None` when there is no index to resolve.
    pub fn try_new(index: Option<&'a mut SpecIndex>) -> Option<Self> {
        index.map(Self::new)
    }

    /// Routes polymorphic cycles to [`ignored_poly_references`](Self::ignored_poly_references).
    pub fn ignore_polymorphic_circular_references(&mut self) {
        self.ignore_poly = true;
    }

    /// Routes array cycles to [`ignored_array_references`](Self::ignored_array_references).
    pub fn ignore_array_circular_references(&mut self) {
        self.ignore_array = true;
    }

    /// The index being resolved.
    pub fn index(&self) -> &SpecIndex {
        self.index
    }

    /// Walks the index, splicing resolved content into the document in place.
    ///
    /// Returns every problem found. Infinite cycles are left unresolved.
    pub fn resolve(&mut self) -> Vec<ResolvingError> {
        self.visit_index(true);
        self.report_infinite_loops();
        tracing::debug!(
            document = %self.index.location(),
            errors = self.resolving_errors.len(),
            circular = self.circular_references.len(),
            visited = self.references_visited,
            "resolve complete"
        );
        self.resolving_errors.clone()
    }

    /// Walks the index without modifying the document, recording cycles on the index.
    pub fn check_for_circular_references(&mut self) -> Vec<ResolvingError> {
        self.visit_index(false);
        self.report_infinite_loops();
        self.index
            .set_circular_references(self.circular_references.clone());
        tracing::debug!(
            document = %self.index.location(),
            errors = self.resolving_errors.len(),
            circular = self.circular_references.len(),
            visited = self.references_visited,
            "circular reference check complete"
        );
        self.resolving_errors.clone()
    }

    /// Every problem found so far.
    pub fn resolving_errors(&self) -> &[ResolvingError] {
        &self.resolving_errors
    }

    /// Cycles that were not routed to an ignored list.
    pub fn circular_references(&self) -> &[CircularReferenceResult] {
        &self.circular_references
    }

    /// Infinite cycles whose closing `$ref` is a polymorphic branch.
    pub fn polymorphic_circular_errors(&self) -> Vec<&CircularReferenceResult> {
        self.circular_references
            .iter()
            .filter(|c| c.is_infinite_loop && c.is_polymorphic_result)
            .collect()
    }

    /// Infinite cycles whose closing `$ref` is not a polymorphic branch.
    pub fn non_polymorphic_circular_errors(&self) -> Vec<&CircularReferenceResult> {
        self.circular_references
            .iter()
            .filter(|c| c.is_infinite_loop && !c.is_polymorphic_result)
            .collect()
    }

    /// Infinite cycles.
    pub fn infinite_circular_references(&self) -> Vec<&CircularReferenceResult> {
        self.circular_references
            .iter()
            .filter(|c| c.is_infinite_loop)
            .collect()
    }

    /// Cycles that have a finite instance.
    pub fn safe_circular_references(&self) -> Vec<&CircularReferenceResult> {
        self.circular_references
            .iter()
            .filter(|c| !c.is_infinite_loop)
            .collect()
    }

    /// Polymorphic cycles set aside by [`ignore_polymorphic_circular_references`](Self::ignore_polymorphic_circular_references).
    pub fn ignored_poly_references(&self) -> &[CircularReferenceResult] {
        &self.ignored_poly_references
    }

    /// Array cycles set aside by [`ignore_array_circular_references`](Self::ignore_array_circular_references).
    pub fn ignored_array_references(&self) -> &[CircularReferenceResult] {
        &self.ignored_array_references
    }

    /// Number of reference visits, memoized ones included.
    pub fn references_visited(&self) -> usize {
        self.references_visited
    }

    /// Number of indexes walked.
    pub fn indexes_visited(&self) -> usize {
        self.indexes_visited
    }

    /// Number of top-level journeys started.
    pub fn journeys_taken(&self) -> usize {
        self.journeys_taken
    }

    /// Number of `$ref` sites found inside visited nodes.
    pub fn relatives_seen(&self) -> usize {
        self.relatives_seen
    }

    fn visit_index(&mut self, resolve: bool) {
        self.indexes_visited += 1;
        self.index.map_external_references();

        let mapped = self.index.mapped_references_sequenced();
        let mapped_ids: HashSet<RefId> = mapped.iter().copied().collect();
        let schemas: Vec<RefId> = self
            .index
            .all_component_schemas()
            .values()
            .copied()
            .filter(|id| !mapped_ids.contains(id))
            .collect();

        for id in mapped.into_iter().chain(schemas) {
            self.journeys_taken += 1;
            let content = self.visit_reference(id, &[], resolve);
            if resolve {
                self.write_back(id, content);
            }
        }

        self.report_unlocated_sites();
        if resolve {
            self.splice_sites();
        }
    }

    /// Visits one reference, returning its (resolved, in resolve mode) content.
    fn visit_reference(&mut self, id: RefId, journey: &[RefId], resolve: bool) -> Value {
        self.references_visited += 1;
        {
            let reference = self.index.reference(id);
            if reference.resolved || reference.seen {
                return reference.content().clone();
            }
        }

        let mut journey = journey.to_vec();
        journey.push(id);
        let mut content = self.index.reference(id).node.clone();

        let relatives = self.extract_relatives(id, &content, &journey, resolve);
        let mut spliced: Vec<String> = Vec::new();

        for relative in relatives {
            if let Some(loop_index) = self.position_in_journey(&journey, relative.target) {
                if !self.index.reference(relative.target).circular {
                    let is_array = relative.parent_schema_type.as_deref() == Some("array");
                    let is_infinite =
                        self.is_infinite_circular_dependency(relative.target, &mut HashSet::new(), None);
                    let result = self.circular_result(
                        &journey,
                        relative.target,
                        loop_index,
                        is_infinite,
                        is_array,
                        None,
                        relative.position,
                    );
                    self.mark_circular(relative.target);
                    if self.ignore_array && is_array {
                        self.ignored_array_references.push(result);
                    } else {
                        self.circular_references.push(result);
                    }
                }
                continue;
            }

            let resolved = self.visit_reference(relative.target, &journey, resolve);
            if resolve
                && !self.index.reference(relative.target).circular
                && !is_nested_in(&spliced, &relative.pointer)
            {
                if let Some(slot) = content.pointer_mut(&relative.pointer) {
                    *slot = resolved;
                    spliced.push(relative.pointer);
                }
            }
            self.index.reference_mut(relative.target).seen = true;
            self.index.reference_mut(id).seen = true;
        }

        let reference = self.index.reference_mut(id);
        reference.resolved = true;
        reference.seen = true;
        if resolve {
            reference.resolved_node = Some(content.clone());
        }
        content
    }

    fn position_in_journey(&self, journey: &[RefId], target: RefId) -> Option<usize> {
        let target = &self.index.reference(target).full_definition;
        journey
            .iter()
            .position(|id| &self.index.reference(*id).full_definition == target)
    }

    fn mark_circular(&mut self, id: RefId) {
        let reference = self.index.reference_mut(id);
        reference.seen = true;
        reference.circular = true;
    }

    /// Finds the `$ref` sites inside `node`, which is the content of `reference`.
    ///
    /// Polymorphic branches are visited as they are found.
    fn extract_relatives(
        &mut self,
        reference: RefId,
        node: &Value,
        journey: &[RefId],
        resolve: bool,
    ) -> Vec<Relative> {
        if journey.len() > MAX_JOURNEY_LENGTH {
            return Vec::new();
        }

        let walk = Walk {
            reference,
            referrer: Locator::parse(&self.index.reference(reference).full_definition),
            journey,
            resolve,
        };
        let mut found = Vec::new();
        let mut pointer = String::new();
        self.walk_relatives(&walk, node, None, &mut pointer, &mut found);
        self.relatives_seen += found.len();
        found
    }

    fn walk_relatives(
        &mut self,
        walk: &Walk<'_>,
        node: &Value,
        parent: Option<&Value>,
        pointer: &mut String,
        found: &mut Vec<Relative>,
    ) {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    if key == "$ref" {
                        if let Value::String(raw) = value {
                            self.locate_relative(walk, raw, parent, pointer, found);
                        }
                    } else if POLYMORPHIC_KEYWORDS.contains(&key.as_str()) {
                        self.visit_polymorphic(walk, key, value, pointer);
                    }

                    if value.is_object() || value.is_array() {
                        let len = pointer.len();
                        pointer.push('/');
                        pointer.push_str(&escape_pointer_segment(key));
                        self.walk_relatives(walk, value, Some(node), pointer, found);
                        pointer.truncate(len);
                    }
                }
            }
            Value::Array(items) => {
                for (i, value) in items.iter().enumerate() {
                    if value.is_object() || value.is_array() {
                        let len = pointer.len();
                        pointer.push('/');
                        pointer.push_str(&i.to_string());
                        self.walk_relatives(walk, value, Some(node), pointer, found);
                        pointer.truncate(len);
                    }
                }
            }
            _ => {}
        }
    }

    fn locate_relative(
        &mut self,
        walk: &Walk<'_>,
        raw: &str,
        parent: Option<&Value>,
        pointer: &str,
        found: &mut Vec<Relative>,
    ) {
        let full_definition = Locator::parse(raw).resolve(&walk.referrer).to_string();
        let (document, absolute) = {
            let referrer = self.index.reference(walk.reference);
            (referrer.document.clone(), format!("{}{}", referrer.pointer, pointer))
        };
        let position = self.index.position_of(&document, &absolute);

        match self.index.search_index_for_reference(&full_definition) {
            Some(target) => {
                let schema_type = parent_schema_type(parent);
                self.index.reference_mut(target).parent_node_schema_type = schema_type.clone();
                found.push(Relative {
                    target,
                    pointer: pointer.to_string(),
                    parent_schema_type: schema_type,
                    position,
                });
            }
            None => self.report_missing(raw, format!("{}#{}", document, absolute), position),
        }
    }

    fn visit_polymorphic(&mut self, walk: &Walk<'_>, keyword: &str, value: &Value, pointer: &str) {
        let base = format!("{}/{}", pointer, keyword);
        let branches: Vec<(String, &Value)> = match value {
            Value::Object(map) => map
                .get("items")
                .filter(|v| v.is_object())
                .map(|v| (format!("{}/items", base), v))
                .into_iter()
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_object())
                .map(|(i, v)| (format!("{}/{}", base, i), v))
                .collect(),
            _ => Vec::new(),
        };

        for (branch_pointer, branch) in branches {
            let Some(raw) = branch.get("$ref").and_then(Value::as_str) else {
                continue;
            };
            let full_definition = Locator::parse(raw).resolve(&walk.referrer).to_string();
            // Missing branch targets are reported by the generic walk.
            let Some(target) = self.index.search_index_for_reference(&full_definition) else {
                continue;
            };
            if self.index.reference(target).circular {
                continue;
            }

            match self.position_in_journey(walk.journey, target) {
                None => {
                    self.visit_reference(target, walk.journey, walk.resolve);
                }
                Some(loop_index) => {
                    let position = {
                        let referrer = self.index.reference(walk.reference);
                        let absolute = format!("{}{}", referrer.pointer, branch_pointer);
                        self.index.position_of(&referrer.document, &absolute)
                    };
                    let is_infinite =
                        self.is_infinite_circular_dependency(target, &mut HashSet::new(), None);
                    let result = self.circular_result(
                        walk.journey,
                        target,
                        loop_index,
                        is_infinite,
                        false,
                        Some(keyword),
                        position,
                    );
                    self.mark_circular(target);
                    if self.ignore_poly {
                        self.ignored_poly_references.push(result);
                    } else {
                        self.circular_references.push(result);
                    }
                }
            }
        }
    }

    /// Whether `id` reaches `initial` again through required properties alone.
    ///
    /// Definitions already explored in this search are not explored twice.
    fn is_infinite_circular_dependency(
        &mut self,
        id: RefId,
        visited: &mut HashSet<String>,
        initial: Option<RefId>,
    ) -> bool {
        let initial = initial.unwrap_or(id);
        let initial_definition = self.index.reference(initial).full_definition.clone();
        let required: Vec<String> = self
            .index
            .reference(id)
            .required_ref_properties
            .keys()
            .cloned()
            .collect();

        for definition in required {
            let Some(next) = self.index.search_index_for_reference(&definition) else {
                continue;
            };
            let next_definition = self.index.reference(next).full_definition.clone();
            if next_definition == initial_definition {
                return true;
            }
            if visited.len() >= MAX_JOURNEY_LENGTH || !visited.insert(next_definition) {
                continue;
            }
            if self.is_infinite_circular_dependency(next, visited, Some(initial)) {
                return true;
            }
        }
        false
    }

    #[allow(clippy::too_many_arguments)]
    fn circular_result(
        &self,
        journey: &[RefId],
        start: RefId,
        loop_index: usize,
        is_infinite: bool,
        is_array: bool,
        polymorphic_type: Option<&str>,
        position: Option<Position>,
    ) -> CircularReferenceResult {
        let mut path: Vec<RefId> = journey.to_vec();
        path.push(start);
        let journey_path = path
            .iter()
            .map(|id| self.index.reference(*id).name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        let reference = self.index.reference(start);

        CircularReferenceResult {
            journey: path,
            journey_path,
            start,
            start_name: reference.name.clone(),
            start_definition: reference.full_definition.clone(),
            loop_index,
            loop_point: start,
            is_infinite_loop: is_infinite,
            is_polymorphic_result: polymorphic_type.is_some(),
            is_array_result: is_array,
            polymorphic_type: polymorphic_type.map(str::to_string),
            position: position.or(reference.position),
        }
    }

    fn report_missing(&mut self, raw: &str, key: String, position: Option<Position>) {
        if !self.reported_missing.insert(key) {
            return;
        }
        tracing::debug!(reference = raw, "missing reference");
        self.resolving_errors.push(ResolvingError {
            kind: ResolvingErrorKind::MissingReference {
                reference: raw.to_string(),
            },
            position,
            path: friendly_path(raw),
            circular_reference: None,
        });
    }

    /// Reports the sites of the document whose targets no walk located.
    fn report_unlocated_sites(&mut self) {
        let document = self.index.location().document();
        let sites: Vec<(String, String, String, Option<Position>)> = self
            .index
            .all_sequenced_references()
            .iter()
            .map(|s| (s.raw.clone(), s.full_definition.clone(), s.pointer.clone(), s.position))
            .collect();

        for (raw, full_definition, pointer, position) in sites {
            if self.index.search_index_for_reference(&full_definition).is_none() {
                self.report_missing(&raw, format!("{}#{}", document, pointer), position);
            }
        }
    }

    fn report_infinite_loops(&mut self) {
        let infinite: Vec<CircularReferenceResult> = self
            .circular_references
            .iter()
            .filter(|c| c.is_infinite_loop)
            .cloned()
            .collect();

        for result in infinite {
            self.resolving_errors.push(ResolvingError {
                kind: ResolvingErrorKind::InfiniteCircularReference {
                    start: result.start_name.clone(),
                },
                position: result.position,
                path: result.journey_path.clone(),
                circular_reference: Some(result),
            });
        }
    }

    /// Writes the resolved content of a reference back at its own location.
    fn write_back(&mut self, id: RefId, content: Value) {
        let reference = self.index.reference(id);
        if !self.index.is_own_document(&reference.document) {
            return;
        }
        let pointer = reference.pointer.clone();
        self.index.splice(&pointer, content);
    }

    /// Replaces every resolvable, non-circular `$ref` site of the document
    /// with its target's resolved content.
    fn splice_sites(&mut self) {
        let sites: Vec<(String, String)> = self
            .index
            .all_sequenced_references()
            .iter()
            .map(|s| (s.full_definition.clone(), s.pointer.clone()))
            .collect();

        let mut spliced: Vec<String> = Vec::new();
        for (full_definition, pointer) in sites {
            if is_nested_in(&spliced, &pointer) {
                continue;
            }
            let Some(id) = self.index.search_index_for_reference(&full_definition) else {
                continue;
            };
            let reference = self.index.reference(id);
            if reference.circular || !reference.seen {
                continue;
            }
            let content = reference.content().clone();
            if self.index.splice(&pointer, content) {
                spliced.push(pointer);
            }
        }
    }
}

/// Whether `pointer` lies strictly beneath one of the already spliced pointers.
fn is_nested_in(spliced: &[String], pointer: &str) -> bool {
    spliced.iter().any(|p| {
        pointer.len() > p.len() && pointer.starts_with(p.as_str()) && pointer.as_bytes()[p.len()] == b'/'
    })
}

#![deny(missing_docs)]

//! # Document Loading
//!
//! Turns raw YAML / JSON bytes into a `serde_json::Value` tree and remembers
//! where every `$ref` key sits in the source text, so resolution errors can
//! point at a line and column.
//!
//! JSON is parsed through the YAML parser (YAML is a superset), key order is
//! preserved, and non-string mapping keys such as `200:` are stringified.

use crate::error::AppResult;
use crate::index::ref_utils::escape_pointer_segment;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// The format of a document, detected from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileExtension {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
    /// Anything else.
    Unsupported,
}

impl FileExtension {
    /// Detects the extension of a path or URL path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => FileExtension::Yaml,
            Some("json") => FileExtension::Json,
            _ => FileExtension::Unsupported,
        }
    }

    /// Whether documents with this extension can be indexed.
    pub fn is_supported(self) -> bool {
        !matches!(self, FileExtension::Unsupported)
    }
}

/// A 1-based line / column location in a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number, starting at 1.
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A parsed document: its tree plus the source position of each `$ref` site.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    root: Value,
    positions: HashMap<String, Position>,
}

impl ParsedDocument {
    /// Wraps an already built tree. No source positions are known.
    pub fn from_value(root: Value) -> Self {
        Self {
            root,
            positions: HashMap::new(),
        }
    }

    /// The document tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Consumes the document, returning its tree.
    pub fn into_root(self) -> Value {
        self.root
    }

    /// Position of the `$ref` key of the map found at `pointer`, if known.
    pub fn position_of(&self, pointer: &str) -> Option<Position> {
        self.positions.get(pointer).copied()
    }

    /// All known `$ref` positions, keyed by the JSON Pointer of the owning map.
    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub(crate) fn into_parts(self) -> (Value, HashMap<String, Position>) {
        (self.root, self.positions)
    }
}

/// Parses YAML or JSON bytes into a [`ParsedDocument`].
///
/// Empty content yields a `null` document.
pub fn parse_document(content: &[u8]) -> AppResult<ParsedDocument> {
    let text = String::from_utf8_lossy(content);
    if text.trim().is_empty() {
        return Ok(ParsedDocument::default());
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(&text)?;
    let root = yaml_to_json(yaml);
    let positions = pair_ref_positions(&root, &text);

    Ok(ParsedDocument { root, positions })
}

/// A `$ref` occurrence found while walking a tree.
#[derive(Debug, Clone)]
pub(crate) struct RawSite<'a> {
    /// JSON Pointer of the map holding the `$ref` key.
    pub pointer: String,
    /// The raw `$ref` value.
    pub value: &'a str,
    /// The container holding that map, if any.
    pub parent: Option<&'a Value>,
}

/// Collects every `$ref` site beneath `root`, in document order.
pub(crate) fn collect_ref_sites(root: &Value) -> Vec<RawSite<'_>> {
    let mut out = Vec::new();
    let mut pointer = String::new();
    walk_sites(root, None, &mut pointer, &mut out);
    out
}

fn walk_sites<'a>(
    node: &'a Value,
    parent: Option<&'a Value>,
    pointer: &mut String,
    out: &mut Vec<RawSite<'a>>,
) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                if key == "$ref" {
                    if let Value::String(target) = value {
                        out.push(RawSite {
                            pointer: pointer.clone(),
                            value: target,
                            parent,
                        });
                    }
                }
                if value.is_object() || value.is_array() {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape_pointer_segment(key));
                    walk_sites(value, Some(node), pointer, out);
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
                    walk_sites(value, Some(node), pointer, out);
                    pointer.truncate(len);
                }
            }
        }
        _ => {}
    }
}

/// A `$ref` key found in the source text, with its value when it sits on the same line.
struct ScannedRef {
    position: Position,
    value: Option<String>,
}

/// Pairs `$ref` keys found in the source text with the sites found in the tree.
///
/// Both lists are in document order. Each site takes the next unclaimed key
/// whose value matches its own, so keys inside block scalars are skipped and
/// sites repeated through YAML aliases find no key. Unmatched sites get no
/// position.
fn pair_ref_positions(root: &Value, text: &str) -> HashMap<String, Position> {
    let sites = collect_ref_sites(root);
    let scanned = scan_ref_keys(text);

    let mut positions = HashMap::with_capacity(sites.len());
    let mut cursor = 0;
    for site in sites {
        let found = scanned[cursor..].iter().position(|hit| match &hit.value {
            Some(value) => value == site.value,
            None => true,
        });
        match found {
            Some(offset) => {
                positions.insert(site.pointer, scanned[cursor + offset].position);
                cursor += offset + 1;
            }
            None => {
                tracing::debug!(pointer = %site.pointer, "$ref position unavailable");
            }
        }
    }
    positions
}

/// Finds the position of every `$ref` mapping key in YAML or JSON source.
fn scan_ref_keys(text: &str) -> Vec<ScannedRef> {
    static REF_KEY_RE: OnceLock<Regex> = OnceLock::new();
    let re = REF_KEY_RE.get_or_init(|| {
        Regex::new(
            r##"(?m)(?:^[ \t]*(?:-[ \t]+)*|[{,][ \t]*)(["']?\$ref["']?)[ \t]*:(?:[ \t]*(?:"([^"\n]*)"|'([^'\n]*)'|([^\s,}\]'"#][^\n,}\]]*)))?"##,
        )
        .expect("Invalid regex")
    });

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    re.captures_iter(text)
        .filter_map(|caps| {
            let key = caps.get(1)?;
            let offset = key.start();
            let line_idx = line_starts.partition_point(|&start| start <= offset) - 1;
            let column = text[line_starts[line_idx]..offset].chars().count() + 1;

            let value = match (caps.get(2), caps.get(3), caps.get(4)) {
                (Some(double), _, _) => Some(double.as_str().to_string()),
                (_, Some(single), _) => Some(single.as_str().replace("''", "'")),
                (_, _, Some(plain)) => {
                    let plain = plain.as_str();
                    let plain = plain.split(" #").next().unwrap_or(plain);
                    Some(plain.trim_end().to_string())
                }
                _ => None,
            };

            Some(ScannedRef {
                position: Position {
                    line: line_idx + 1,
                    column,
                },
                value,
            })
        })
        .collect()
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(yaml_key_to_string(k), yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key_to_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

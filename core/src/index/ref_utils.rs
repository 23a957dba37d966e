#![deny(missing_docs)]

//! # Reference Utilities
//!
//! Shared helpers for turning `$ref` fragments into JSON Pointers usable on a
//! parsed tree, and back into short human readable paths for diagnostics.

use percent_encoding::percent_decode_str;

/// Decodes a JSON Pointer segment (handles `~1`, `~0` and percent encoding).
pub(crate) fn decode_pointer_segment(segment: &str) -> String {
    let decoded = segment.replace("~1", "/").replace("~0", "~");
    percent_decode_str(&decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Escapes a map key so it can be appended to a JSON Pointer.
pub(crate) fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Normalizes a `$ref` fragment (without the leading `#`) into a canonical
/// JSON Pointer.
///
/// Every segment is decoded and re-escaped, so `/paths/%7Bid%7D` and
/// `/paths/{id}` address the same node. The empty fragment and `/` both
/// address the document root.
pub(crate) fn normalize_fragment_pointer(fragment: &str) -> String {
    let trimmed = fragment.trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .split('/')
        .map(|seg| format!("/{}", escape_pointer_segment(&decode_pointer_segment(seg))))
        .collect()
}

/// Returns the last segment of a definition, e.g. `#/components/schemas/Pet` -> `Pet`.
///
/// Definitions without a fragment (whole-file references) are named after the file.
pub(crate) fn name_from_definition(definition: &str) -> String {
    let (doc, fragment) = match definition.split_once('#') {
        Some((doc, fragment)) => (doc, fragment),
        None => (definition, ""),
    };

    let last = fragment.rsplit('/').find(|s| !s.is_empty());
    match last {
        Some(seg) => decode_pointer_segment(seg),
        None => doc
            .rsplit(|c: char| c == '/' || c == '\\')
            .find(|s| !s.is_empty())
            .unwrap_or(doc)
            .to_string(),
    }
}

/// Converts a `$ref` value into a short, JSONPath-like location used in
/// diagnostics.
///
/// `#/components/schemas/Pet` becomes `$.components.schemas.Pet`; segments
/// that are not plain identifiers are bracket-quoted, so `#/paths/~1pets`
/// becomes `$.paths['/pets']`. References without a fragment are returned
/// unchanged.
pub(crate) fn friendly_path(reference: &str) -> String {
    let Some((_, fragment)) = reference.split_once('#') else {
        return reference.to_string();
    };

    let mut out = String::from("$");
    for seg in fragment.split('/').filter(|s| !s.is_empty()) {
        let decoded = decode_pointer_segment(seg);
        let plain = decoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if plain {
            out.push('.');
            out.push_str(&decoded);
        } else {
            out.push_str(&format!("['{}']", decoded));
        }
    }
    out
}

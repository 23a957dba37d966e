#![deny(missing_docs)]

//! # Reference Locators
//!
//! A `$ref` value is one of four shapes:
//!
//! | Shape | Example |
//! |---|---|
//! | same-document fragment | `#/components/schemas/Pet` |
//! | relative file | `../common.yaml#/Error` |
//! | absolute file | `/specs/common.yaml#/Error` |
//! | URL | `https://example.com/common.yaml#/Error` |
//!
//! [`Locator::resolve`] places a locator relative to the location of the
//! reference it was found in, producing a canonical locator. Two references
//! target the same node iff their canonical strings (`Display`) are equal.
//!
//! No filesystem or network access happens here: file paths are joined and
//! cleaned lexically, URLs are joined per RFC 3986.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// A parsed `$ref` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A fragment within the current document (`#/a/b`).
    Fragment {
        /// The fragment, without the leading `#`.
        fragment: String,
    },
    /// A file path relative to the referring document.
    RelativeFile {
        /// Lexically cleaned relative path.
        path: PathBuf,
        /// Optional fragment, without the leading `#`.
        fragment: Option<String>,
    },
    /// An absolute file path.
    AbsoluteFile {
        /// Lexically cleaned absolute path.
        path: PathBuf,
        /// Optional fragment, without the leading `#`.
        fragment: Option<String>,
    },
    /// An `http` / `https` URL.
    Url {
        /// The document URL, without fragment.
        url: Url,
        /// Optional fragment, without the leading `#`.
        fragment: Option<String>,
    },
}

impl Locator {
    /// Parses a raw `$ref` value or a canonical location string.
    pub fn parse(raw: &str) -> Self {
        let (doc, fragment) = match raw.split_once('#') {
            Some((doc, frag)) => (doc, Some(frag.to_string())),
            None => (raw, None),
        };

        if doc.is_empty() {
            return Locator::Fragment {
                fragment: fragment.unwrap_or_default(),
            };
        }

        if let Some(mut url) = parse_remote_url(doc) {
            url.set_fragment(None);
            return Locator::Url { url, fragment };
        }

        let path = clean_path(Path::new(doc));
        if path.is_absolute() {
            Locator::AbsoluteFile { path, fragment }
        } else {
            Locator::RelativeFile { path, fragment }
        }
    }

    /// A locator for the document itself (no fragment) of an in-memory document.
    pub fn in_memory() -> Self {
        Locator::Fragment {
            fragment: String::new(),
        }
    }

    /// Resolves this locator relative to the location of the referring reference.
    ///
    /// `relative_to` is typically the referrer's canonical full definition;
    /// its fragment is ignored.
    pub fn resolve(&self, relative_to: &Locator) -> Locator {
        match self {
            Locator::Url { .. } | Locator::AbsoluteFile { .. } => self.clone(),
            Locator::RelativeFile { path, fragment } => match relative_to {
                Locator::Url { url, .. } => match url.join(&path_to_url_string(path)) {
                    Ok(mut joined) => {
                        joined.set_fragment(None);
                        Locator::Url {
                            url: joined,
                            fragment: fragment.clone(),
                        }
                    }
                    Err(_) => self.clone(),
                },
                Locator::AbsoluteFile { path: base, .. } => Locator::AbsoluteFile {
                    path: join_sibling(base, path),
                    fragment: fragment.clone(),
                },
                Locator::RelativeFile { path: base, .. } => Locator::RelativeFile {
                    path: join_sibling(base, path),
                    fragment: fragment.clone(),
                },
                Locator::Fragment { .. } => self.clone(),
            },
            Locator::Fragment { fragment } => relative_to.with_fragment(Some(fragment.clone())),
        }
    }

    /// Returns the same document with a different fragment.
    ///
    /// For an in-memory document a missing fragment means the document root.
    pub fn with_fragment(&self, fragment: Option<String>) -> Locator {
        match self {
            Locator::Fragment { .. } => Locator::Fragment {
                fragment: fragment.unwrap_or_default(),
            },
            Locator::RelativeFile { path, .. } => Locator::RelativeFile {
                path: path.clone(),
                fragment,
            },
            Locator::AbsoluteFile { path, .. } => Locator::AbsoluteFile {
                path: path.clone(),
                fragment,
            },
            Locator::Url { url, .. } => Locator::Url {
                url: url.clone(),
                fragment,
            },
        }
    }

    /// The document part of the location (`""` for the current, in-memory document).
    pub fn document(&self) -> String {
        match self {
            Locator::Fragment { .. } => String::new(),
            Locator::RelativeFile { path, .. } | Locator::AbsoluteFile { path, .. } => {
                path.to_string_lossy().into_owned()
            }
            Locator::Url { url, .. } => url.to_string(),
        }
    }

    /// The fragment part, without `#`.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Locator::Fragment { fragment } => Some(fragment),
            Locator::RelativeFile { fragment, .. }
            | Locator::AbsoluteFile { fragment, .. }
            | Locator::Url { fragment, .. } => fragment.as_deref(),
        }
    }

    /// The document-local definition: `#fragment`, or the whole location when
    /// there is no fragment.
    pub fn definition(&self) -> String {
        match self.fragment() {
            Some(frag) => format!("#{}", frag),
            None => self.to_string(),
        }
    }

    /// Whether the location lives behind a URL.
    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Url { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Fragment { fragment } => write!(f, "#{}", fragment),
            other => {
                f.write_str(&other.document())?;
                match other.fragment() {
                    Some(frag) => write!(f, "#{}", frag),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Parses `s` as an `http` / `https` URL. Other schemes (and Windows drive
/// letters, which parse as one-letter schemes) are not treated as remote.
pub(crate) fn parse_remote_url(s: &str) -> Option<Url> {
    let url = Url::parse(s).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Lexically normalizes a path: drops `.` segments and folds `..` into the
/// preceding segment where one exists.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Joins `path` onto the directory containing `base`.
fn join_sibling(base: &Path, path: &Path) -> PathBuf {
    let dir = base.parent().unwrap_or_else(|| Path::new(""));
    clean_path(&dir.join(path))
}

fn path_to_url_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

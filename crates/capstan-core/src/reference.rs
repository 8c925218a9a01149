//! Normalized bundle reference parsing.
//!
//! Bundle references use the container-registry reference grammar:
//! `[host/]path[:tag][@digest]`. Single-segment names normalize onto the
//! default registry and the `library/` namespace, mirroring how container
//! tooling resolves short names. The claim store only needs the repository
//! portion (no tag, no digest) to fill `bundle_repository` on an
//! installation.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Registry assumed for references that do not name a host.
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Repository namespace assumed for single-segment names.
pub const OFFICIAL_REPO_PREFIX: &str = "library/";

/// Errors raised while parsing a bundle reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReferenceError {
    /// The reference string was empty.
    #[error("reference is empty")]
    Empty,

    /// The repository portion contains invalid characters or components.
    #[error("invalid repository name '{name}'")]
    InvalidRepository {
        /// The rejected repository string.
        name: String,
    },

    /// The tag portion is malformed.
    #[error("invalid tag '{tag}'")]
    InvalidTag {
        /// The rejected tag string.
        tag: String,
    },

    /// The digest portion is malformed.
    #[error("invalid digest '{digest}'")]
    InvalidDigest {
        /// The rejected digest string.
        digest: String,
    },
}

/// A parsed, normalized bundle reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

fn path_component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("static pattern")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").expect("static pattern"))
}

fn digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[a-fA-F0-9]{32,}$").expect("static pattern"))
}

/// Reports whether the leading segment of a reference names a registry.
///
/// A segment is a registry host when it contains a dot or a port, or is the
/// literal `localhost`; anything else is part of the repository path.
fn is_domain(segment: &str) -> bool {
    segment == "localhost" || segment.contains('.') || segment.contains(':')
}

/// Parses a reference and normalizes the registry and repository namespace.
///
/// # Errors
///
/// Returns a [`ReferenceError`] describing the malformed portion when the
/// string does not match the reference grammar.
pub fn parse_normalized(raw: &str) -> Result<Reference, ReferenceError> {
    if raw.is_empty() {
        return Err(ReferenceError::Empty);
    }

    let (remainder, digest) = match raw.split_once('@') {
        Some((name, digest)) => {
            if !digest_pattern().is_match(digest) {
                return Err(ReferenceError::InvalidDigest {
                    digest: digest.to_string(),
                });
            }
            (name, Some(digest.to_string()))
        }
        None => (raw, None),
    };

    // A colon after the last slash separates the tag; a colon before it
    // belongs to the registry port.
    let last_slash = remainder.rfind('/');
    let (name, tag) = match remainder.rfind(':') {
        Some(colon) if last_slash.map_or(true, |slash| colon > slash) => {
            let tag = &remainder[colon + 1..];
            if !tag_pattern().is_match(tag) {
                return Err(ReferenceError::InvalidTag {
                    tag: tag.to_string(),
                });
            }
            (&remainder[..colon], Some(tag.to_string()))
        }
        _ => (remainder, None),
    };

    let (domain, path) = match name.split_once('/') {
        Some((first, rest)) if is_domain(first) => (first.to_string(), rest.to_string()),
        _ => {
            let path = if name.contains('/') {
                name.to_string()
            } else {
                format!("{OFFICIAL_REPO_PREFIX}{name}")
            };
            (DEFAULT_DOMAIN.to_string(), path)
        }
    };

    if path.is_empty()
        || !path
            .split('/')
            .all(|component| path_component_pattern().is_match(component))
    {
        return Err(ReferenceError::InvalidRepository {
            name: name.to_string(),
        });
    }

    Ok(Reference {
        domain,
        path,
        tag,
        digest,
    })
}

impl Reference {
    /// The registry host.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The repository path within the registry.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The tag, when one was given.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest, when one was given.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The fully-qualified repository name, including the registry host.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// The repository in familiar form: the default registry and the
    /// `library/` namespace are elided when they were inferred, and any tag
    /// or digest is dropped.
    #[must_use]
    pub fn repository(&self) -> String {
        if self.domain == DEFAULT_DOMAIN {
            self.path
                .strip_prefix(OFFICIAL_REPO_PREFIX)
                .unwrap_or(&self.path)
                .to_string()
        } else {
            self.name()
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

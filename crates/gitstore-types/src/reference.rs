//! Named references: hash references (branches, tags, remote tips) and
//! symbolic references (`HEAD`).
//!
//! Reference names follow git-style conventions:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not start or end with `/`, must not end with `.` or `.lock`
//! - Must not contain consecutive slashes (`//`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ObjectHash;

/// Characters that are forbidden anywhere in a reference name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// A validated, hierarchical reference name such as `refs/heads/main`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceName(String);

impl ReferenceName {
    /// Name of the `HEAD` symbolic reference.
    pub const HEAD: &'static str = "HEAD";

    /// Validate and wrap a reference name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// `HEAD`.
    pub fn head() -> Self {
        Self(Self::HEAD.to_string())
    }

    /// `refs/heads/<branch>`.
    pub fn branch(branch: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/heads/{branch}"))
    }

    /// `refs/tags/<tag>`.
    pub fn tag(tag: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/tags/{tag}"))
    }

    /// `refs/remotes/<remote>/<branch>`.
    pub fn remote(remote: &str, branch: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/remotes/{remote}/{branch}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with its well-known prefix stripped (`refs/heads/main` -> `main`).
    pub fn short(&self) -> &str {
        ["refs/heads/", "refs/tags/", "refs/remotes/"]
            .iter()
            .find_map(|p| self.0.strip_prefix(p))
            .unwrap_or(&self.0)
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("refs/remotes/")
    }
}

fn validate(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidReferenceName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control()) {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid("must not contain '@{'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err(invalid("must not end with '.' or '.lock'"));
    }
    if name.contains("//") {
        return Err(invalid("must not contain consecutive slashes"));
    }
    Ok(())
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferenceName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ReferenceName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReferenceName> for String {
    fn from(name: ReferenceName) -> Self {
        name.0
    }
}

/// Discriminant of a [`Reference`], as persisted by every backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Hash,
    Symbolic,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash-reference",
            Self::Symbolic => "symbolic-reference",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash-reference" => Ok(Self::Hash),
            "symbolic-reference" => Ok(Self::Symbolic),
            other => Err(TypeError::UnknownReferenceType(other.to_string())),
        }
    }
}

/// A named, mutable pointer to an object or to another reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    /// Points directly at an object hash.
    Hash { name: ReferenceName, hash: ObjectHash },
    /// Points at another reference by name.
    Symbolic {
        name: ReferenceName,
        target: ReferenceName,
    },
}

impl Reference {
    pub fn hash(name: ReferenceName, hash: ObjectHash) -> Self {
        Self::Hash { name, hash }
    }

    pub fn symbolic(name: ReferenceName, target: ReferenceName) -> Self {
        Self::Symbolic { name, target }
    }

    pub fn name(&self) -> &ReferenceName {
        match self {
            Self::Hash { name, .. } | Self::Symbolic { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::Hash { .. } => ReferenceKind::Hash,
            Self::Symbolic { .. } => ReferenceKind::Symbolic,
        }
    }

    /// The resolved hash. Symbolic references resolve to the zero hash.
    pub fn target_hash(&self) -> ObjectHash {
        match self {
            Self::Hash { hash, .. } => *hash,
            Self::Symbolic { .. } => ObjectHash::ZERO,
        }
    }

    /// The symbolic target, if any.
    pub fn target(&self) -> Option<&ReferenceName> {
        match self {
            Self::Hash { .. } => None,
            Self::Symbolic { target, .. } => Some(target),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { name, hash } => write!(f, "{hash} {name}"),
            Self::Symbolic { name, target } => write!(f, "ref: {target} {name}"),
        }
    }
}

//! Tenant namespacing.
//!
//! A [`Namespace`] partitions one physical backend between many
//! repositories. Key-value backends render it into a key prefix; the
//! relational backend stores the rendered form in its `url` column.
//!
//! Rendering rules:
//! - every tenant/module segment is escaped (`%` -> `%25`, `:` -> `%3A`),
//!   so an unescaped `:` is always a structural separator
//! - module scopes render as `<parent>:module:<name>`
//! - keys render as `<namespace>:<key type>[:<sub key>]`
//!
//! Two distinct namespaces therefore never produce the same key, and no key
//! of one namespace falls under the scan prefix of another.

use std::fmt;

use gitstore_types::{ObjectHash, ObjectType, ReferenceName};

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Logical key space within a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyType {
    Object,
    Ref,
    Config,
    Shallow,
    Index,
    Module,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Ref => "ref",
            Self::Config => "config",
            Self::Shallow => "shallow",
            Self::Index => "index",
            Self::Module => "module",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant (repository) scope, optionally nested into submodules.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    tenant: String,
    modules: Vec<String>,
    rendered: String,
}

impl Namespace {
    /// Root namespace for a tenant, typically a repository URL.
    pub fn new(tenant: impl Into<String>) -> Self {
        let tenant = tenant.into();
        let rendered = escape_segment(&tenant);
        Self {
            tenant,
            modules: Vec::new(),
            rendered,
        }
    }

    /// Child namespace for the submodule `name`.
    pub fn module(&self, name: &str) -> Self {
        let mut modules = self.modules.clone();
        modules.push(name.to_string());
        let rendered = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.rendered,
            KeyType::Module,
            escape_segment(name)
        );
        Self {
            tenant: self.tenant.clone(),
            modules,
            rendered,
        }
    }

    /// The root tenant string as supplied by the caller.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Submodule path from the root tenant, outermost first.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Rendered, collision-free identifier for this namespace.
    pub fn tenant_id(&self) -> &str {
        &self.rendered
    }

    /// Fully-qualified key: `<namespace>:<key type>[:<sub key>]`.
    pub fn key(&self, kind: KeyType, sub_key: Option<&str>) -> String {
        match sub_key {
            Some(sub) => format!("{}{SEPARATOR}{kind}{SEPARATOR}{sub}", self.rendered),
            None => format!("{}{SEPARATOR}{kind}", self.rendered),
        }
    }

    /// Literal prefix shared by every sub-keyed entry of `kind`.
    pub fn key_prefix(&self, kind: KeyType) -> String {
        format!("{}{SEPARATOR}{kind}{SEPARATOR}", self.rendered)
    }

    /// Glob pattern matching every key of `kind` whose sub key starts with
    /// `sub_prefix`. Glob metacharacters in the literal part are escaped.
    pub fn pattern(&self, kind: KeyType, sub_prefix: &str) -> String {
        let mut pattern = glob_escape(&self.key_prefix(kind));
        pattern.push_str(&glob_escape(sub_prefix));
        pattern.push('*');
        pattern
    }

    /// Key of an object payload: `<namespace>:object:<type>:<hash>`.
    pub fn object_key(&self, kind: ObjectType, hash: &ObjectHash) -> String {
        self.key(KeyType::Object, Some(&format!("{kind}{SEPARATOR}{hash}")))
    }

    /// Key of a reference: `<namespace>:ref:<name>`.
    pub fn ref_key(&self, name: &ReferenceName) -> String {
        self.key(KeyType::Ref, Some(name.as_str()))
    }

    /// Recover `(type, hash)` from a key produced by [`Namespace::object_key`].
    pub fn parse_object_key(&self, key: &str) -> Option<(ObjectType, ObjectHash)> {
        let sub = key.strip_prefix(&self.key_prefix(KeyType::Object))?;
        let (kind, hash) = sub.split_once(SEPARATOR)?;
        Some((kind.parse().ok()?, hash.parse().ok()?))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

/// Escape glob metacharacters so `s` matches only itself in a `SCAN MATCH`
/// style pattern.
pub fn glob_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_tenant_renders_verbatim() {
        let ns = Namespace::new("repo-a");
        assert_eq!(ns.key(KeyType::Config, None), "repo-a:config");
        assert_eq!(ns.key(KeyType::Ref, Some("refs/heads/main")), "repo-a:ref:refs/heads/main");
    }

    #[test]
    fn url_tenant_is_escaped() {
        let ns = Namespace::new("https://github.com/org/repo.git");
        assert_eq!(ns.tenant_id(), "https%3A//github.com/org/repo.git");
        assert_eq!(ns.tenant(), "https://github.com/org/repo.git");
    }

    #[test]
    fn module_namespaces_nest() {
        let root = Namespace::new("repo");
        let child = root.module("libs/core");
        let grandchild = child.module("vendor");
        assert_eq!(child.tenant_id(), "repo:module:libs/core");
        assert_eq!(grandchild.tenant_id(), "repo:module:libs/core:module:vendor");
        assert_eq!(grandchild.modules(), &["libs/core".to_string(), "vendor".to_string()]);
        assert_eq!(grandchild.tenant(), "repo");
    }

    #[test]
    fn module_cannot_impersonate_sibling_or_root() {
        let root = Namespace::new("repo");
        // A root tenant spelled like a module path stays distinct.
        let fake = Namespace::new("repo:module:x");
        assert_ne!(root.module("x").tenant_id(), fake.tenant_id());
        // A module name containing the separator stays inside its own scope.
        let tricky = root.module("x:ref");
        assert_eq!(tricky.tenant_id(), "repo:module:x%3Aref");
    }

    #[test]
    fn object_key_roundtrip() {
        let ns = Namespace::new("t");
        let hash = ObjectHash::from_raw([0xab; 20]);
        let key = ns.object_key(ObjectType::OfsDelta, &hash);
        assert_eq!(key, format!("t:object:ofs-delta:{hash}"));
        assert_eq!(ns.parse_object_key(&key), Some((ObjectType::OfsDelta, hash)));
        assert_eq!(Namespace::new("u").parse_object_key(&key), None);
    }

    #[test]
    fn pattern_escapes_glob_chars() {
        let ns = Namespace::new("weird[*]?");
        assert_eq!(
            ns.pattern(KeyType::Object, "blob:"),
            "weird\\[\\*\\]\\?:object:blob:*"
        );
    }

    fn namespace_strategy() -> impl Strategy<Value = Namespace> {
        (
            "[a-c:%/]{0,6}",
            proptest::collection::vec("[a-c:%]{0,4}", 0..3),
        )
            .prop_map(|(tenant, modules)| {
                modules
                    .iter()
                    .fold(Namespace::new(tenant), |ns, m| ns.module(m))
            })
    }

    proptest! {
        #[test]
        fn distinct_namespaces_never_share_keys(
            a in namespace_strategy(),
            b in namespace_strategy(),
            sub_a in "[a-z/:]{0,6}",
            sub_b in "[a-z/:]{0,6}",
        ) {
            prop_assume!(a != b);
            for kind in [KeyType::Object, KeyType::Ref] {
                prop_assert_ne!(a.key(kind, Some(&sub_a)), b.key(kind, Some(&sub_b)));
            }
            for kind in [KeyType::Config, KeyType::Shallow, KeyType::Index, KeyType::Module] {
                prop_assert_ne!(a.key(kind, None), b.key(kind, None));
            }
        }

        #[test]
        fn scan_prefix_never_reaches_other_namespace(
            a in namespace_strategy(),
            b in namespace_strategy(),
            sub in "[a-z/:]{0,6}",
        ) {
            prop_assume!(a != b);
            for kind in [KeyType::Object, KeyType::Ref] {
                let key = b.key(kind, Some(&sub));
                prop_assert!(!key.starts_with(&a.key_prefix(kind)));
            }
        }
    }
}

//! Repository configuration document.
//!
//! Like the index, this is persisted whole by the storage engine. Sections
//! mirror the ones a VCS client keeps in its repository config file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub is_bare: bool,
    #[serde(default)]
    pub worktree: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    pub urls: Vec<String>,
    /// Fetch refspecs, e.g. `+refs/heads/*:refs/remotes/origin/*`.
    #[serde(default)]
    pub fetch: Vec<String>,
}

impl RemoteConfig {
    /// A remote with the default fetch refspec for `name`.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let fetch = vec![format!("+refs/heads/*:refs/remotes/{name}/*")];
        Self {
            name,
            urls: vec![url.into()],
            fetch,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub merge: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleConfig {
    pub name: String,
    pub path: String,
    pub url: String,
}

/// Repository configuration. `Default` is the empty configuration returned
/// for tenants that never stored one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
    #[serde(default)]
    pub branches: BTreeMap<String, BranchConfig>,
    #[serde(default)]
    pub submodules: BTreeMap<String, SubmoduleConfig>,
    /// Sections this type does not model, kept verbatim.
    #[serde(default)]
    pub extra: BTreeMap<String, BTreeMap<String, String>>,
}

impl RepoConfig {
    pub fn add_remote(&mut self, remote: RemoteConfig) {
        self.remotes.insert(remote.name.clone(), remote);
    }

    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        let cfg = RepoConfig::default();
        assert!(!cfg.core.is_bare);
        assert!(cfg.remotes.is_empty());
        assert!(cfg.branches.is_empty());
        assert!(cfg.submodules.is_empty());
    }

    #[test]
    fn remote_gets_default_refspec() {
        let mut cfg = RepoConfig::default();
        cfg.add_remote(RemoteConfig::new("origin", "https://example.com/repo.git"));
        let origin = cfg.remote("origin").unwrap();
        assert_eq!(origin.fetch, vec!["+refs/heads/*:refs/remotes/origin/*"]);
    }

    #[test]
    fn empty_json_object_is_default() {
        let cfg: RepoConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RepoConfig::default());
    }
}

//! Release catalog: on-disk change declarations and the resolved chain.
//!
//! Each release is one TOML file naming its predecessor; exactly one file
//! has no predecessor and anchors the chain. Loading walks the predecessor
//! links through a successor index, assigns 1-based sequence numbers, and
//! rejects anything that is not a simple unbroken path.
//!
//! A `Catalog` is an immutable value. Reload means building a fresh catalog
//! and swapping it in; nothing is mutated in place under a running apply.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CatalogError;

/// One SQL fragment of a change: inline text, or a file under the script root.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SqlFragment {
    Inline(String),
    File { path: PathBuf },
}

/// One versioned unit of SQL work within a release.
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub version: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sql: Vec<SqlFragment>,
}

/// On-disk shape of a release declaration file.
#[derive(Debug, Deserialize)]
struct ReleaseFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    previous: Option<String>,
    #[serde(rename = "change", default)]
    changes: Vec<Change>,
}

/// A named, ordered set of versioned changes; one node in the chain.
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub previous: Option<String>,
    /// 1-based position in the resolved chain.
    pub sequence: u32,
    /// Sorted by version; versions are contiguous starting at 1.
    pub changes: Vec<Change>,
    /// Highest declared change version.
    pub last_version: i32,
}

impl Release {
    /// Look up a change by version number.
    pub fn change(&self, version: i32) -> Option<&Change> {
        self.changes.iter().find(|c| c.version == version)
    }
}

/// The resolved total order over all declared releases.
///
/// `releases` is kept in chain order, so the last element is the latest
/// release. An empty catalog is valid: a fresh checkout with no change
/// files yet is not an error.
#[derive(Debug, Default)]
pub struct Catalog {
    releases: Vec<Release>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Load every release declaration (`*.toml`, non-recursive) from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CatalogError> {
        let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path);
            }
        }
        files.sort();

        let mut declared = Vec::new();
        for path in files {
            let text = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let file: ReleaseFile = toml::from_str(&text).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?;
            if file.name.is_empty() {
                return Err(CatalogError::MissingName { path });
            }
            declared.push(file);
        }

        Self::link(declared)
    }

    /// Validate declarations and resolve them into a chain.
    fn link(declared: Vec<ReleaseFile>) -> Result<Self, CatalogError> {
        if declared.is_empty() {
            return Ok(Self::default());
        }

        let mut releases = Vec::with_capacity(declared.len());
        let mut index = HashMap::new();
        for file in declared {
            let release = validate_release(file)?;
            if index.insert(release.name.clone(), releases.len()).is_some() {
                return Err(CatalogError::DuplicateRelease {
                    release: release.name,
                });
            }
            releases.push(release);
        }

        let roots: Vec<usize> = releases
            .iter()
            .enumerate()
            .filter(|(_, r)| r.previous.is_none())
            .map(|(i, _)| i)
            .collect();
        if roots.len() != 1 {
            return Err(CatalogError::NoRoot { found: roots.len() });
        }

        // Successor adjacency: predecessor name -> declaring releases.
        let mut successors: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, release) in releases.iter().enumerate() {
            if let Some(prev) = &release.previous {
                successors.entry(prev.clone()).or_default().push(i);
            }
        }

        // Walk from the root. Anything short of a simple path covering every
        // declared release (fork, dangling link, cycle) breaks the chain at
        // the release we are standing on.
        let mut order = vec![roots[0]];
        releases[roots[0]].sequence = 1;
        while order.len() < releases.len() {
            let current = *order.last().unwrap_or(&roots[0]);
            let next = match successors.get(releases[current].name.as_str()) {
                Some(found) if found.len() == 1 => found[0],
                _ => {
                    return Err(CatalogError::BrokenChain {
                        release: releases[current].name.clone(),
                    });
                }
            };
            releases[next].sequence = order.len() as u32 + 1;
            order.push(next);
        }

        let releases: Vec<Release> = order.into_iter().map(|i| releases[i].clone()).collect();
        let index = releases
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Ok(Self { releases, index })
    }

    /// Releases in chain order.
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Look up a release by name.
    pub fn get(&self, name: &str) -> Option<&Release> {
        self.index.get(name).map(|&i| &self.releases[i])
    }

    /// Look up a release by its chain sequence number.
    pub fn by_sequence(&self, sequence: u32) -> Option<&Release> {
        if sequence == 0 {
            return None;
        }
        self.releases.get(sequence as usize - 1)
    }

    /// The release immediately before `release` in the chain.
    pub fn predecessor_of(&self, release: &Release) -> Option<&Release> {
        self.by_sequence(release.sequence.checked_sub(1)?)
    }

    /// The release with the highest sequence, if any are declared.
    pub fn latest(&self) -> Option<&Release> {
        self.releases.last()
    }

    /// Closest declared release name, for "did you mean" suggestions.
    pub fn closest_name(&self, name: &str) -> Option<String> {
        self.releases
            .iter()
            .map(|r| (strsim::jaro_winkler(name, &r.name), &r.name))
            .filter(|(score, _)| *score > 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, name)| name.clone())
    }
}

/// Per-release structural checks; returns the release with sorted changes.
fn validate_release(file: ReleaseFile) -> Result<Release, CatalogError> {
    if file.changes.is_empty() {
        return Err(CatalogError::EmptyChangeSet { release: file.name });
    }

    let mut changes = file.changes;
    changes.sort_by_key(|c| c.version);

    let min = changes[0].version;
    if min != 1 {
        return Err(CatalogError::VersionsDoNotStartAtOne {
            release: file.name,
            found: min,
        });
    }
    for (i, change) in changes.iter().enumerate() {
        let expected = i as i32 + 1;
        if change.version < expected {
            return Err(CatalogError::DuplicateVersion {
                release: file.name.clone(),
                version: change.version,
            });
        }
        if change.version > expected {
            return Err(CatalogError::VersionGap {
                release: file.name.clone(),
                missing: expected,
            });
        }
    }

    let last_version = changes.len() as i32;
    Ok(Release {
        name: file.name,
        previous: file.previous.filter(|p| !p.is_empty()),
        sequence: 0,
        changes,
        last_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_release(dir: &TempDir, file: &str, body: &str) {
        fs::write(dir.path().join(file), body).unwrap();
    }

    fn three_release_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "r1.toml",
            r#"
name = "R1"

[[change]]
version = 1
description = "users table"
sql = ["CREATE TABLE users (id BIGSERIAL PRIMARY KEY)"]

[[change]]
version = 2
sql = ["CREATE INDEX idx_users ON users (id)"]
"#,
        );
        write_release(
            &dir,
            "r2.toml",
            r#"
name = "R2"
previous = "R1"

[[change]]
version = 1
sql = ["ALTER TABLE users ADD COLUMN email TEXT"]
"#,
        );
        write_release(
            &dir,
            "r3.toml",
            r#"
name = "R3"
previous = "R2"

[[change]]
version = 1
sql = [{ path = "r3/001_orders.sql" }]
"#,
        );
        dir
    }

    #[test]
    fn load_assigns_contiguous_sequences() {
        let dir = three_release_dir();
        let catalog = Catalog::load(dir.path()).unwrap();

        assert_eq!(catalog.len(), 3);
        let sequences: Vec<u32> = catalog.releases().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(catalog.get("R1").unwrap().sequence, 1);
        assert_eq!(catalog.get("R1").unwrap().last_version, 2);
        assert_eq!(catalog.latest().unwrap().name, "R3");
        assert_eq!(catalog.predecessor_of(catalog.get("R2").unwrap()).unwrap().name, "R1");
    }

    #[test]
    fn empty_directory_is_an_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.latest().is_none());
    }

    #[test]
    fn missing_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "bad.toml", "[[change]]\nversion = 1\nsql = []\n");
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::MissingName { .. }));
    }

    #[test]
    fn empty_change_set_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "bad.toml", "name = \"R1\"\n");
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyChangeSet { .. }));
    }

    #[test]
    fn versions_must_start_at_one() {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "bad.toml",
            "name = \"R1\"\n\n[[change]]\nversion = 2\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::VersionsDoNotStartAtOne { found: 2, .. }
        ));
    }

    #[test]
    fn version_gaps_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "bad.toml",
            "name = \"R1\"\n\n[[change]]\nversion = 1\nsql = []\n\n[[change]]\nversion = 2\nsql = []\n\n[[change]]\nversion = 4\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::VersionGap { missing: 3, .. }));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "bad.toml",
            "name = \"R1\"\n\n[[change]]\nversion = 1\nsql = []\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateVersion { version: 1, .. }));
    }

    #[test]
    fn no_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "a.toml",
            "name = \"A\"\nprevious = \"B\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        write_release(
            &dir,
            "b.toml",
            "name = \"B\"\nprevious = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::NoRoot { found: 0 }));
    }

    #[test]
    fn two_roots_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "a.toml", "name = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n");
        write_release(&dir, "b.toml", "name = \"B\"\n\n[[change]]\nversion = 1\nsql = []\n");
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::NoRoot { found: 2 }));
    }

    #[test]
    fn empty_previous_counts_as_root() {
        let dir = TempDir::new().unwrap();
        write_release(
            &dir,
            "a.toml",
            "name = \"A\"\nprevious = \"\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.get("A").unwrap().sequence, 1);
    }

    #[test]
    fn forked_chain_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "a.toml", "name = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n");
        write_release(
            &dir,
            "b.toml",
            "name = \"B\"\nprevious = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        write_release(
            &dir,
            "c.toml",
            "name = \"C\"\nprevious = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenChain { release } if release == "A"));
    }

    #[test]
    fn dangling_predecessor_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "a.toml", "name = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n");
        write_release(
            &dir,
            "b.toml",
            "name = \"B\"\nprevious = \"NOPE\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenChain { release } if release == "A"));
    }

    #[test]
    fn duplicate_release_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_release(&dir, "a.toml", "name = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n");
        write_release(
            &dir,
            "a2.toml",
            "name = \"A\"\nprevious = \"A\"\n\n[[change]]\nversion = 1\nsql = []\n",
        );
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateRelease { .. }));
    }

    #[test]
    fn non_toml_files_are_ignored() {
        let dir = three_release_dir();
        fs::write(dir.path().join("notes.md"), "not a release").unwrap();
        fs::write(dir.path().join("001_orders.sql"), "CREATE TABLE orders ()").unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn closest_name_suggests_near_misses() {
        let dir = three_release_dir();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.closest_name("R22").as_deref(), Some("R2"));
        assert_eq!(catalog.closest_name("zzz"), None);
    }
}

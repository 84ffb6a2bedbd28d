#![allow(dead_code)]

use std::fs;

use tempfile::TempDir;

use reltrain_core::Catalog;
use reltrain_core::config::{DatabaseGroup, DatabaseTarget, Replacement};

pub const AUDIT_TABLE: &str = "public._reltrain_change_log";

/// The two-release chain from the end-to-end scenarios:
/// R1 (root, versions 1-2) -> R2 (versions 1-3).
pub fn two_release_catalog() -> (TempDir, Catalog) {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("r1.toml"),
        r#"
name = "R1"

[[change]]
version = 1
description = "users table"
sql = ["CREATE TABLE users (id BIGSERIAL PRIMARY KEY)"]

[[change]]
version = 2
sql = ["ALTER TABLE users ADD COLUMN email TEXT"]
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("r2.toml"),
        r#"
name = "R2"
previous = "R1"

[[change]]
version = 1
description = "orders table"
sql = ["CREATE TABLE orders (id BIGSERIAL PRIMARY KEY)"]

[[change]]
version = 2
sql = ["ALTER TABLE orders ADD COLUMN total NUMERIC"]

[[change]]
version = 3
sql = ["CREATE INDEX idx_orders ON orders (id)"]
"#,
    )
    .unwrap();

    let catalog = Catalog::load(dir.path()).unwrap();
    (dir, catalog)
}

pub fn target(name: &str) -> DatabaseTarget {
    DatabaseTarget {
        name: name.to_string(),
        url: format!("mem://{name}"),
        replacements: Vec::new(),
    }
}

pub fn target_with_replacement(name: &str, text: &str, with: &str) -> DatabaseTarget {
    DatabaseTarget {
        name: name.to_string(),
        url: format!("mem://{name}"),
        replacements: vec![Replacement {
            text: text.to_string(),
            with: with.to_string(),
        }],
    }
}

pub fn group(targets: Vec<DatabaseTarget>) -> DatabaseGroup {
    DatabaseGroup {
        name: "DEFAULT".to_string(),
        targets,
    }
}

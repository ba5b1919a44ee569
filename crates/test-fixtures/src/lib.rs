//! Shared test support for the MindSync crates: golden merge scenarios,
//! payload and operation builders, and a transport double that records
//! what the coordinator pushes.

pub mod builders;
pub mod transport;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use builders::*;
pub use transport::RecordingTransport;

fn golden_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/golden"))
}

/// Read a golden scenario, e.g. `load_fixture("crdt/concurrent_contacts.json")`.
///
/// # Panics
/// On a missing or malformed file; a broken fixture should fail the test loudly.
pub fn load_fixture<T: DeserializeOwned>(relative_path: &str) -> T {
    let path = golden_dir().join(relative_path);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(err) => panic!("golden fixture {} unreadable: {err}", path.display()),
    };
    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(err) => panic!("golden fixture {} does not parse: {err}", path.display()),
    }
}

pub fn fixture_exists(relative_path: &str) -> bool {
    golden_dir().join(relative_path).is_file()
}

/// Golden `.json` files under `subdir`, sorted by name. Empty if the
/// directory is missing.
pub fn list_fixtures(subdir: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(golden_dir().join(subdir)) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    found.sort();
    found
}

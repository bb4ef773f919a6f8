//! Durable storage for the state document.
//!
//! Only the long-lived subset of the tree is written: the ephemeral regions
//! named by the runtime config (ui, logs, notifications and the like) are
//! stripped before serialization and reinitialize fresh on the next boot.
//! The written form is the raw JSON document, with no version tag.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("persisted state is not a JSON object: {path}")]
    NotAnObject { path: String },
}

/// Writes the persistable subset of `document` to `path`, replacing any
/// previous contents.
pub fn save(
    path: &Path,
    document: &Value,
    ephemeral_regions: &[String],
) -> Result<(), PersistenceError> {
    let mut persisted = document.clone();
    if let Value::Object(map) = &mut persisted {
        for region in ephemeral_regions {
            if map.remove(region).is_some() {
                debug!("stripped ephemeral region {}", region);
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    serde_json::to_writer_pretty(&mut file, &persisted)?;
    file.flush()?;
    info!("state persisted to {}", path.display());
    Ok(())
}

/// Reads a previously saved document. A missing file is not an error, it
/// simply means there is nothing to rehydrate.
pub fn load(path: &Path) -> Result<Option<Value>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let document: Value = serde_json::from_str(&raw)?;
    if !document.is_object() {
        return Err(PersistenceError::NotAnObject {
            path: path.display().to_string(),
        });
    }
    Ok(Some(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn round_trips_without_ephemeral_regions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state.json");
        let document = json!({
            "workspace": {"status": "IDLE", "artifacts": []},
            "ui": {"selectedTab": "profile"},
            "notifications": [{"id": "n1"}]
        });

        save(
            &file,
            &document,
            &["ui".to_string(), "notifications".to_string()],
        )
        .unwrap();
        let loaded = load(&file).unwrap().unwrap();

        assert_eq!(
            loaded,
            json!({"workspace": {"status": "IDLE", "artifacts": []}})
        );
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn unknown_regions_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state.json");
        let document = json!({"workspace": {}, "futureRegion": {"kept": true}});

        save(&file, &document, &[]).unwrap();
        assert_eq!(load(&file).unwrap().unwrap(), document);
    }

    #[test]
    fn rejects_non_object_documents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state.json");
        fs::write(&file, "[1, 2]").unwrap();

        assert!(matches!(
            load(&file),
            Err(PersistenceError::NotAnObject { .. })
        ));
    }
}

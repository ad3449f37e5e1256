//! JSON document persistence shared by the registry, the identity store,
//! preferences and the notification log.
//!
//! Every write replaces the whole document: the new contents go to a
//! sibling temporary file which is then renamed over the target, so a
//! crash mid-write leaves either the previous or the new document.
use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Reads and deserializes a JSON document.
///
/// Returns `Ok(None)` when the file does not exist, and
/// [`Error::ConfigParse`] when it exists but cannot be read or parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::ConfigParse(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::ConfigParse(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
///
/// Parent directories are created as needed.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Persistence(format!("Failed to serialize document: {}", e)))?;
    content.push('\n');

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
            parent
        }
        None => Path::new("."),
    };

    let write_err =
        |e: std::io::Error| Error::Persistence(format!("Failed to write {}: {}", path.display(), e));
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // The temporary file is removed if the rename fails
    tmp.persist(path).map_err(|e| {
        Error::Persistence(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let doc: Option<Doc> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<Doc>> = read_json(&path);
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_write_replaces_whole_document_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &Doc { name: "a".into(), count: 1 }).unwrap();
        write_json_atomic(&path, &Doc { name: "b".into(), count: 2 }).unwrap();

        let doc: Doc = read_json(&path).unwrap().unwrap();
        assert_eq!(doc, Doc { name: "b".into(), count: 2 });

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_replace_cleans_up_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file
        let path = dir.path().join("doc.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let result = write_json_atomic(&path, &Doc { name: "a".into(), count: 1 });
        assert!(matches!(result, Err(Error::Persistence(_))));

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("doc.json")]);
    }
}

//! Atomic JSON persistence
//!
//! Every file this crate writes goes through [`write_json_atomic`]: serialize,
//! write to a temp file in the target directory, fsync, rename over the
//! target, fsync the directory. Readers therefore observe either the previous
//! version of a file or the new one, never a torn write.
//!
//! Temp files are created with a `.tmp` prefix and no `.json` extension, so a
//! crash between write and rename leaves nothing that directory listings by
//! id would pick up.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Field injected into every stored entity document
pub const SAVED_AT_FIELD: &str = "_saved_at";

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Creates missing parent directories.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".tmp")
        .suffix(".partial")
        .tempfile_in(parent_dir)?;
    temp_file.write_all(json.as_bytes())?;
    temp_file.write_all(b"\n")?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    // Make the rename durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }

    debug!(path = %path.display(), bytes = json.len(), "File written atomically");
    Ok(())
}

/// Read and deserialize a JSON file.
///
/// Returns `Ok(None)` when the file does not exist and an
/// [`io::ErrorKind::InvalidData`] error when it cannot be parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Current UTC time in RFC 3339, as stored in `_saved_at`
pub fn saved_at_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Stamp a payload with `_saved_at`.
///
/// Objects get the field added in place; any other JSON value is wrapped as
/// `{"data": value, "_saved_at": ...}`.
pub fn with_saved_at(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert(SAVED_AT_FIELD.to_string(), Value::String(saved_at_now()));
            Value::Object(map)
        }
        other => serde_json::json!({
            "data": other,
            SAVED_AT_FIELD: saved_at_now(),
        }),
    }
}

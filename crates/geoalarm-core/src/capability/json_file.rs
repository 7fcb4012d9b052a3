// ── JSON file store ──
//
// Keeps the ordered alarm list under a single `alarms` key in one JSON
// document. Writes go to a sibling temp file that is renamed over the
// target, so a reader never sees a half-written list.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PersistentStore;
use crate::error::CapabilityError;
use crate::model::Alarm;

#[derive(Serialize)]
struct DocumentRef<'a> {
    alarms: &'a [Alarm],
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    alarms: Vec<Alarm>,
}

/// [`PersistentStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistentStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Alarm>, CapabilityError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no alarm file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: Document = serde_json::from_str(&raw)?;
        Ok(doc.alarms)
    }

    fn save(&self, alarms: &[Alarm]) -> Result<(), CapabilityError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&DocumentRef { alarms })?;
        let tmp = self.temp_path();
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), count = alarms.len(), "alarms saved");
        Ok(())
    }
}

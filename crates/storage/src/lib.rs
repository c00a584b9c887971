use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use doc_model::{AnnotationSet, DocumentId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SESSION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything needed to put the editor back where the user left it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub document_id: DocumentId,
    pub display_name: Option<String>,
    pub annotations: AnnotationSet,
    pub current_page: u32,
    pub zoom: f32,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEnvelope {
    version: u32,
    session: SessionSnapshot,
}

/// "Last document / last annotation list" store, kept apart from the
/// per-document byte cache.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfMarkup", "PdfMarkup")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last saved session. A missing, unreadable or outdated file reads as
    /// no session.
    pub fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        let bytes = match fs::read(self.session_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice::<SessionEnvelope>(&bytes) {
            Ok(envelope) if envelope.version == SESSION_SCHEMA_VERSION => {
                Ok(Some(envelope.session))
            }
            Ok(envelope) => {
                log::debug!("ignoring session with schema version {}", envelope.version);
                Ok(None)
            }
            Err(err) => {
                log::debug!("ignoring unreadable session file: {err}");
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &SessionSnapshot) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            SessionEnvelope { version: SESSION_SCHEMA_VERSION, session: session.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        let path = self.session_path();
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, bytes)?;
        fs::rename(temp, path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{AnnotationId, Color, RectAnnotation};

    fn snapshot() -> SessionSnapshot {
        let mut annotations = AnnotationSet::default();
        annotations.rects.push(RectAnnotation {
            id: AnnotationId(1),
            page_index: 2,
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            color: Color::WHITE,
        });

        SessionSnapshot {
            document_id: DocumentId::new("abc123").expect("id should be valid"),
            display_name: Some("Contract.pdf".to_string()),
            annotations,
            current_page: 2,
            zoom: 1.5,
            saved_at: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .expect("timestamp should parse")
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn session_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SessionStore::with_root(temp.path());

        store.save(&snapshot()).expect("save should succeed");
        let loaded = store.load().expect("load should succeed");

        assert_eq!(loaded, Some(snapshot()));
    }

    #[test]
    fn load_returns_none_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SessionStore::with_root(temp.path());

        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn corrupt_session_reads_as_no_session() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SessionStore::with_root(temp.path());
        fs::write(temp.path().join("session.json"), b"{ not json").expect("write should succeed");

        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn newer_schema_reads_as_no_session() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SessionStore::with_root(temp.path());
        store.save(&snapshot()).expect("save should succeed");

        let path = temp.path().join("session.json");
        let text = fs::read_to_string(&path).expect("session should exist");
        fs::write(&path, text.replacen("\"version\": 1", "\"version\": 99", 1))
            .expect("write should succeed");

        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn clear_removes_the_session() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SessionStore::with_root(temp.path());
        store.save(&snapshot()).expect("save should succeed");

        store.clear().expect("clear should succeed");
        store.clear().expect("clearing twice should succeed");
        assert_eq!(store.load().expect("load should succeed"), None);
    }
}

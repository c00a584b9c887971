use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remotely stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentIdError {
    #[error("document reference is empty")]
    Empty,
    #[error("local file paths cannot be opened as remote documents: {0}")]
    LocalPath(String),
    #[error("no document id found in {0}")]
    Unrecognized(String),
}

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DocumentIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DocumentIdError::Empty);
        }
        Ok(Self(id))
    }

    /// Accepts a bare id or a sharing URL (`.../d/<id>/view`, `...?id=<id>`).
    pub fn parse(input: &str) -> Result<Self, DocumentIdError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DocumentIdError::Empty);
        }
        if is_local_path(input) {
            return Err(DocumentIdError::LocalPath(input.to_owned()));
        }

        if !input.contains("://") {
            if input.contains(['/', '?', '&', ' ']) {
                return Err(DocumentIdError::Unrecognized(input.to_owned()));
            }
            return Ok(Self(input.to_owned()));
        }

        if let Some((_, after)) = input.split_once("/d/") {
            let id = after.split(['/', '?', '#']).next().unwrap_or_default();
            if !id.is_empty() {
                return Ok(Self(id.to_owned()));
            }
        }

        if let Some((_, query)) = input.split_once('?') {
            let id = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "id")
                .map(|(_, value)| value.split('#').next().unwrap_or_default());
            if let Some(id) = id.filter(|id| !id.is_empty()) {
                return Ok(Self(id.to_owned()));
            }
        }

        Err(DocumentIdError::Unrecognized(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_local_path(input: &str) -> bool {
    if input.starts_with("file://") {
        return true;
    }
    if input.contains("://") {
        return false;
    }
    input.contains(":\\")
        || input.starts_with(['/', '~', '\\'])
        || input.starts_with("./")
        || input.starts_with("../")
        || input.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_path_segment() {
        let id = DocumentId::parse("https://drive.google.com/file/d/1AbC_xyz/view?usp=sharing")
            .expect("url should parse");
        assert_eq!(id.as_str(), "1AbC_xyz");
    }

    #[test]
    fn extracts_id_from_query_parameter() {
        let id = DocumentId::parse("https://drive.google.com/open?id=abc123&authuser=0")
            .expect("url should parse");
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn accepts_bare_ids() {
        assert_eq!(DocumentId::parse("  abc123 ").expect("id should parse").as_str(), "abc123");
    }

    #[test]
    fn rejects_local_paths_and_noise() {
        assert!(matches!(
            DocumentId::parse("C:\\docs\\plan.pdf"),
            Err(DocumentIdError::LocalPath(_))
        ));
        assert!(matches!(
            DocumentId::parse("/home/me/plan.pdf"),
            Err(DocumentIdError::LocalPath(_))
        ));
        for path in ["/tmp/plan.pdf", "./plan.pdf", "../plans/a", "~/plan.pdf", "Plan.PDF"] {
            assert_eq!(
                DocumentId::parse(path),
                Err(DocumentIdError::LocalPath(path.to_owned())),
                "{path} should be treated as a local path"
            );
        }
        assert!(matches!(
            DocumentId::parse("file:///srv/plan.pdf"),
            Err(DocumentIdError::LocalPath(_))
        ));
        assert_eq!(
            DocumentId::parse("https://example.com/file/d/abc/plan.pdf")
                .expect("url should parse")
                .as_str(),
            "abc"
        );
        assert!(matches!(
            DocumentId::parse("https://example.com/files"),
            Err(DocumentIdError::Unrecognized(_))
        ));
        assert_eq!(DocumentId::parse(""), Err(DocumentIdError::Empty));
    }
}

/// Passage data model shared by stores, indexes and the search engine.
///
/// A passage is immutable once ingested; re-ingesting the same source span at the same
/// revision produces the same id, so stores treat it as an in-place replacement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::SecragError;

/// Content family of a passage. Unknown families are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChunkType {
    Code,
    Docs,
    Config,
    Schema,
    Session,
    DetectionSummary,
    Other(String),
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkType::Code => write!(f, "code"),
            ChunkType::Docs => write!(f, "docs"),
            ChunkType::Config => write!(f, "config"),
            ChunkType::Schema => write!(f, "schema"),
            ChunkType::Session => write!(f, "session"),
            ChunkType::DetectionSummary => write!(f, "detection-summary"),
            ChunkType::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for ChunkType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "code" => ChunkType::Code,
            "docs" | "doc" => ChunkType::Docs,
            "config" => ChunkType::Config,
            "schema" => ChunkType::Schema,
            "session" => ChunkType::Session,
            "detection-summary" | "detection_summary" => ChunkType::DetectionSummary,
            _ => ChunkType::Other(s.to_string()),
        })
    }
}

impl From<String> for ChunkType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(chunk_type) => chunk_type,
            Err(never) => match never {},
        }
    }
}

impl From<ChunkType> for String {
    fn from(chunk_type: ChunkType) -> Self {
        chunk_type.to_string()
    }
}

/// Everything about a passage except its text: the "metadata" record of the store
/// upsert interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub file_path: String,
    #[serde(default)]
    pub symbol_name: String,
    #[serde(default)]
    pub symbol_type: String,
    /// 1-based, inclusive
    pub start_line: u32,
    /// 1-based, inclusive, never before start_line
    pub end_line: u32,
    #[serde(default)]
    pub language: String,
    /// Source revision, typically a commit hash
    pub revision: String,
    #[serde(default)]
    pub module_path: String,
    pub chunk_type: ChunkType,
    pub last_modified: DateTime<Utc>,
}

impl PassageMetadata {
    /// Deterministic passage id for this span.
    pub fn id(&self) -> String {
        passage_id(&self.file_path, self.start_line, self.end_line, &self.revision)
    }

    /// Check the fields every citation relies on.
    ///
    /// Called on the ingestion side; the search path assumes it already held.
    pub fn validate(&self) -> Result<(), SecragError> {
        if self.file_path.trim().is_empty() {
            return Err(SecragError::validation("file_path", "file_path cannot be empty"));
        }
        if self.revision.trim().is_empty() {
            return Err(SecragError::validation("revision", "revision cannot be empty"));
        }
        if self.start_line < 1 {
            return Err(SecragError::validation("start_line", "start_line must be >= 1"));
        }
        if self.end_line < self.start_line {
            return Err(SecragError::validation("end_line", "end_line must be >= start_line"));
        }
        Ok(())
    }
}

/// A retrievable unit of content with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(flatten)]
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn new(content: impl Into<String>, metadata: PassageMetadata) -> Self {
        Passage {
            content: content.into(),
            metadata,
        }
    }

    pub fn id(&self) -> String {
        self.metadata.id()
    }
}

/// Derive the passage id from `(file_path, start_line, end_line, revision)`.
///
/// UUIDv5 over the NUL-joined fields; stable across processes and platforms.
pub fn passage_id(file_path: &str, start_line: u32, end_line: u32, revision: &str) -> String {
    let key = format!("{}\0{}\0{}\0{}", file_path, start_line, end_line, revision);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PassageMetadata {
        PassageMetadata {
            file_path: "src/auth/token.rs".to_string(),
            symbol_name: "validate_token".to_string(),
            symbol_type: "function".to_string(),
            start_line: 10,
            end_line: 42,
            language: "rust".to_string(),
            revision: "3f2a9c1".to_string(),
            module_path: "auth::token".to_string(),
            chunk_type: ChunkType::Code,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = metadata();
        let mut b = metadata();
        b.symbol_name = "renamed".to_string();
        b.last_modified = Utc::now();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), passage_id("src/auth/token.rs", 10, 42, "3f2a9c1"));
    }

    #[test]
    fn test_id_changes_with_revision_and_span() {
        let a = metadata();
        let mut b = metadata();
        b.revision = "8812bb0".to_string();
        let mut c = metadata();
        c.end_line = 43;
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_chunk_type_names() {
        assert_eq!("detection-summary".parse::<ChunkType>().unwrap(), ChunkType::DetectionSummary);
        assert_eq!(ChunkType::DetectionSummary.to_string(), "detection-summary");
        assert_eq!(ChunkType::from("CODE".to_string()), ChunkType::Code);
        assert_eq!(
            ChunkType::from("runbook".to_string()),
            ChunkType::Other("runbook".to_string())
        );
    }

    #[test]
    fn test_passage_serializes_flat() {
        let passage = Passage::new("fn validate_token() {}", metadata());
        let value = serde_json::to_value(&passage).unwrap();
        assert_eq!(value["chunk_type"], "code");
        assert_eq!(value["file_path"], "src/auth/token.rs");
        let back: Passage = serde_json::from_value(value).unwrap();
        assert_eq!(back, passage);
    }

    #[test]
    fn test_validate_line_range() {
        let mut m = metadata();
        assert!(m.validate().is_ok());
        m.end_line = 5;
        assert!(matches!(m.validate(), Err(SecragError::Validation { .. })));
        m.end_line = 42;
        m.start_line = 0;
        assert!(m.validate().is_err());
    }
}

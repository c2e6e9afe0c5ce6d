use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Document, Editor};

pub const DOCUMENT_SCHEMA: &str = "ndla-editor";
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DocumentValueError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unexpected draft schema `{0}`")]
    Schema(String),
    #[error("draft version {0} is newer than supported version {DOCUMENT_VERSION}")]
    Version(u32),
}

fn default_schema() -> String {
    DOCUMENT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// JSON envelope for a raw tree kept as a local draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl DocumentValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, DocumentValueError> {
        let value: Self = serde_json::from_str(s)?;
        if value.schema != DOCUMENT_SCHEMA {
            return Err(DocumentValueError::Schema(value.schema));
        }
        if value.version > DOCUMENT_VERSION {
            return Err(DocumentValueError::Version(value.version));
        }
        Ok(value)
    }
}

impl Editor {
    pub fn snapshot(&self) -> DocumentValue {
        DocumentValue::from_document(self.doc().clone())
    }
}

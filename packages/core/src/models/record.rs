//! Record Identity and Representation
//!
//! This module defines the value types a caller hands to the engine: a
//! `RecordIdentifier` naming a record by its external remote ID, and a
//! `RecordRepresentation` pairing that identity with the field data to write.
//!
//! # Remote IDs and aspects
//!
//! External systems address records by a stable, caller-supplied *remote ID*
//! instead of the internal numeric uid assigned by the persistence backend.
//! A remote ID can carry *aspects*: context suffixes that give the same
//! logical record distinct identities. The only aspect currently encoded is
//! the language: on a localizable table, a non-default language produces a
//! composite remote ID (`"product-1|l2"` with the default separator) so each
//! translation maps to its own internal record.
//!
//! # Examples
//!
//! ```rust
//! use contentbridge_core::models::{RecordIdentifier, RecordRepresentation};
//! use serde_json::json;
//!
//! let identifier = RecordIdentifier::new("pages", "landing-page");
//! let representation = RecordRepresentation::new(
//!     identifier,
//!     json!({ "title": "Landing" }),
//! ).unwrap();
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

/// Default language id (the non-translated original)
pub const DEFAULT_LANGUAGE: i64 = 0;

// Remote IDs end up in comma-joined relation lists and composite aspect
// suffixes, so commas, pipes and whitespace are excluded.
const REMOTE_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.:/\-]*$";

/// Validation errors for caller-supplied record values
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required value: {0}")]
    MissingValue(String),

    #[error("Invalid remote ID format: {0}")]
    InvalidRemoteId(String),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Field data must be a JSON object, got: {0}")]
    InvalidData(String),
}

/// Check whether a remote ID has an acceptable shape
///
/// Remote IDs must start with an alphanumeric character and may contain
/// alphanumerics, `_`, `.`, `:`, `/` and `-`.
///
/// # Examples
///
/// ```rust
/// # use contentbridge_core::models::is_valid_remote_id;
/// assert!(is_valid_remote_id("product-123"));
/// assert!(is_valid_remote_id("news:2026/08"));
/// assert!(!is_valid_remote_id("a,b"));
/// assert!(!is_valid_remote_id(""));
/// ```
pub fn is_valid_remote_id(remote_id: &str) -> bool {
    static REMOTE_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REMOTE_ID_REGEX.get_or_init(|| Regex::new(REMOTE_ID_PATTERN).unwrap());
    regex.is_match(remote_id)
}

/// Identity of one record instance as seen by an external caller.
///
/// # Fields
///
/// - `table`: target table in the persistence backend
/// - `remote_id`: caller-supplied stable external identifier
/// - `language`: optional language id; `None` or `0` means the default language
/// - `workspace`: optional workspace id the write is scoped to
///
/// The identifier is immutable once constructed except for the internal
/// `uid`, which the engine fills in after the remote ID has been resolved
/// against the mapping store (or after a create has been committed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIdentifier {
    /// Table the record lives in
    pub table: String,

    /// Caller-supplied stable external identifier
    pub remote_id: String,

    /// Language id (None / 0 = default language)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<i64>,

    /// Workspace id the operation targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<i64>,

    /// Internal uid, set once the remote ID has been resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<i64>,
}

impl RecordIdentifier {
    /// Create an identifier for the default language and workspace
    pub fn new(table: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            remote_id: remote_id.into(),
            language: None,
            workspace: None,
            uid: None,
        }
    }

    /// Create an identifier carrying a language aspect
    pub fn with_language(
        table: impl Into<String>,
        remote_id: impl Into<String>,
        language: i64,
    ) -> Self {
        Self {
            table: table.into(),
            remote_id: remote_id.into(),
            language: Some(language),
            workspace: None,
            uid: None,
        }
    }

    /// Set the workspace aspect
    pub fn in_workspace(mut self, workspace: i64) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Whether this identifier targets a non-default language
    pub fn is_translation(&self) -> bool {
        matches!(self.language, Some(l) if l != DEFAULT_LANGUAGE)
    }

    /// Composite remote ID with aspect suffixes applied.
    ///
    /// `localizable` is the table's localizability as reported by the schema
    /// lookup; the language suffix is only appended for translations of
    /// localizable tables so that non-localizable tables keep a single
    /// identity per remote ID.
    pub fn remote_id_with_aspects(&self, localizable: bool, separator: &str) -> String {
        match self.language {
            Some(language) if localizable && language != DEFAULT_LANGUAGE => {
                format!("{}{}l{}", self.remote_id, separator, language)
            }
            _ => self.remote_id.clone(),
        }
    }

    /// The remote ID with any language aspect stripped: the identity of the
    /// default-language original this translation points back to.
    pub fn base_remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Internal uid, if resolved
    pub fn uid(&self) -> Option<i64> {
        self.uid
    }

    /// Record the resolved internal uid
    pub fn set_uid(&mut self, uid: i64) {
        self.uid = Some(uid);
    }

    /// Validate table name and remote ID shape
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the table name is empty or the remote ID
    /// does not match the accepted shape.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::MissingValue("table".to_string()));
        }
        if self.table.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidTable(self.table.clone()));
        }
        if !is_valid_remote_id(&self.remote_id) {
            return Err(ValidationError::InvalidRemoteId(self.remote_id.clone()));
        }
        Ok(())
    }
}

/// Caller-supplied record value: field data plus the identity it belongs to.
///
/// The `data` map is the "value layer" of an operation: field name to JSON
/// value, exactly as received from the transport layer. The engine's setup
/// pipeline transforms a staged copy of it; the representation itself is
/// never mutated after construction, which keeps the canonical argument
/// tuple (and therefore the idempotence hash) stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRepresentation {
    /// Identity the data belongs to
    pub identifier: RecordIdentifier,

    /// Field name → value mapping
    pub data: Map<String, Value>,
}

impl RecordRepresentation {
    /// Create a representation from an identifier and a JSON object
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the identifier is malformed or `data` is
    /// not a JSON object.
    pub fn new(identifier: RecordIdentifier, data: Value) -> Result<Self, ValidationError> {
        identifier.validate()?;
        match data {
            Value::Object(map) => Ok(Self {
                identifier,
                data: map,
            }),
            other => Err(ValidationError::InvalidData(other.to_string())),
        }
    }

    /// Create a representation with no field data (delete operations)
    pub fn empty(identifier: RecordIdentifier) -> Result<Self, ValidationError> {
        identifier.validate()?;
        Ok(Self {
            identifier,
            data: Map::new(),
        })
    }

    /// Target table shorthand
    pub fn table(&self) -> &str {
        &self.identifier.table
    }

    /// Remote ID shorthand (without aspects)
    pub fn remote_id(&self) -> &str {
        &self.identifier.remote_id
    }
}

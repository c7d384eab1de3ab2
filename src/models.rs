//! Data models for stored entries.

use crate::error::{KitError, Result};
use crate::protect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind assigned when none is given.
pub const DEFAULT_KIND: &str = "Command";

/// Kinds always offered as suggestions.
pub const DEFAULT_KINDS: &[&str] = &["Command", "Link", "URL", "Password"];

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

/// A single stored name/value record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(alias = "Id", default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Display name, also the merge key on import
    #[serde(alias = "Name", default)]
    pub name: String,
    /// Plaintext, or `__ENC__<base64>` when protected
    #[serde(alias = "Value", default)]
    pub value: String,
    #[serde(alias = "Description", default)]
    pub description: Option<String>,
    #[serde(alias = "Kind", default = "default_kind")]
    pub kind: String,
    #[serde(alias = "CreatedUtc", default = "Utc::now")]
    pub created_utc: DateTime<Utc>,
    #[serde(alias = "UpdatedUtc", default = "Utc::now")]
    pub updated_utc: DateTime<Utc>,
    /// Export/import transport marker only
    #[serde(
        alias = "WasEncrypted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub was_encrypted: Option<bool>,
}

impl Entry {
    /// Create a plaintext entry stamped with the current time.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            value: value.into(),
            description: None,
            kind: default_kind(),
            created_utc: now,
            updated_utc: now,
            was_encrypted: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated_utc = updated;
        self
    }

    /// True if the value is stored in protected form.
    pub fn is_encrypted(&self) -> bool {
        protect::is_encrypted(&self.value)
    }

    /// Case-insensitive name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Validated input of an add or edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
    pub kind: String,
    /// Protect the value even when no sensitivity pattern matches
    pub protect: bool,
}

impl EntryDraft {
    /// Normalize raw form input. Name and value are required.
    pub fn new(
        name: &str,
        value: &str,
        description: Option<&str>,
        kind: Option<&str>,
        protect: bool,
    ) -> Result<Self> {
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return Err(KitError::Validation(
                "Name and Value are required.".to_string(),
            ));
        }

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let kind = kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_KIND)
            .to_string();

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            description,
            kind,
            protect,
        })
    }
}

/// Distinct kinds, compared and ordered case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KindSet {
    kinds: BTreeMap<String, String>,
}

impl KindSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the kinds of `entries`.
    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(&entry.kind);
        }
        set
    }

    /// Add `kind` unless blank or already known; the first spelling wins.
    pub fn insert(&mut self, kind: &str) {
        let kind = kind.trim();
        if kind.is_empty() {
            return;
        }
        self.kinds
            .entry(kind.to_lowercase())
            .or_insert_with(|| kind.to_string());
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(&kind.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.kinds.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Known kinds merged with the built-in defaults.
    pub fn suggestions(&self) -> Vec<String> {
        let mut merged = self.clone();
        for kind in DEFAULT_KINDS {
            merged.insert(kind);
        }
        merged.iter().map(str::to_string).collect()
    }
}

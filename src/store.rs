//! JSON-backed entry storage with transparent protection of sensitive values.

use crate::classifier::SensitivityClassifier;
use crate::error::{KitError, Result};
use crate::models::{Entry, EntryDraft, KindSet};
use crate::protect::SecretProtector;
use crate::utils;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of an import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub updated: usize,
    /// Values re-protected because they carried `wasEncrypted`
    pub reprotected: usize,
    /// Incoming entries without a name
    pub skipped: usize,
}

/// Outcome of an export.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: usize,
    /// Protected values written as plaintext
    pub decoded: usize,
    /// Protected values that could not be decoded and were written as stored
    pub left_protected: usize,
}

/// Owner of the entry collection and its backing file.
pub struct EntryStore {
    path: PathBuf,
    entries: Vec<Entry>,
    kinds: KindSet,
    protector: SecretProtector,
    classifier: SensitivityClassifier,
}

impl EntryStore {
    /// Create an empty store backed by `path`. Call [`EntryStore::load`] to read it.
    pub fn new(path: PathBuf, protector: SecretProtector, classifier: SensitivityClassifier) -> Self {
        Self {
            path,
            entries: Vec::new(),
            kinds: KindSet::new(),
            protector,
            classifier,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn kinds(&self) -> &KindSet {
        &self.kinds
    }

    pub fn classifier(&self) -> &SensitivityClassifier {
        &self.classifier
    }

    /// Point-in-time copy for background readers.
    pub fn snapshot(&self) -> Arc<[Entry]> {
        Arc::from(self.entries.as_slice())
    }

    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.has_name(name))
    }

    /// Read the backing file. A missing file yields an empty store; an
    /// unreadable one yields an empty store and an error for the caller to show.
    pub fn load(&mut self) -> Result<()> {
        match self.read_entries() {
            Ok(entries) => {
                self.entries = entries;
                self.kinds = KindSet::from_entries(&self.entries);
                info!(path = %self.path.display(), count = self.entries.len(), "loaded entries");
                Ok(())
            }
            Err(e) => {
                self.entries.clear();
                self.kinds = KindSet::new();
                Err(e)
            }
        }
    }

    fn read_entries(&self) -> Result<Vec<Entry>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no data file yet");
            return Ok(Vec::new());
        }
        let bytes = fs::read(&self.path).map_err(|source| {
            self.backup_unreadable();
            KitError::ReadFile {
                path: self.path.clone(),
                source,
            }
        })?;
        serde_json::from_slice(strip_bom(&bytes)).map_err(|source| {
            self.backup_unreadable();
            KitError::Parse {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Keep a copy of a file we could not read so the next save cannot destroy it.
    fn backup_unreadable(&self) {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::settings::DATA_FILE.to_string());
        let backup = self.path.with_file_name(format!("{file_name}.corrupt.{timestamp}"));
        match fs::copy(&self.path, &backup) {
            Ok(_) => warn!(backup = %backup.display(), "kept a copy of the unreadable data file"),
            Err(e) => warn!("could not back up unreadable data file: {e}"),
        }
    }

    /// Protect sensitive values, then atomically rewrite the backing file.
    pub fn save(&mut self) -> Result<()> {
        self.protect_sensitive();

        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, json.as_bytes())?;

        debug!(path = %self.path.display(), count = self.entries.len(), "saved entries");
        Ok(())
    }

    fn checkpoint(&self) -> (Vec<Entry>, KindSet) {
        (self.entries.clone(), self.kinds.clone())
    }

    /// Save, putting `previous` back in memory if the write fails.
    fn save_or_restore(&mut self, previous: (Vec<Entry>, KindSet)) -> Result<()> {
        match self.save() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("save failed, changes discarded: {e}");
                (self.entries, self.kinds) = previous;
                Err(e)
            }
        }
    }

    /// Protect every non-empty, unprotected value whose entry is sensitive.
    /// Returns how many values were protected.
    pub fn protect_sensitive(&mut self) -> usize {
        let mut protected = 0;
        for entry in &mut self.entries {
            if !entry.is_encrypted()
                && !entry.value.is_empty()
                && self.classifier.is_sensitive(entry)
            {
                entry.value = self.protector.protect(&entry.value);
                if entry.is_encrypted() {
                    protected += 1;
                }
            }
        }
        protected
    }

    fn stored_value(&self, draft: &EntryDraft) -> String {
        let sensitive = self.classifier.is_sensitive_fields(
            &draft.name,
            &draft.kind,
            draft.description.as_deref(),
        );
        if (draft.protect || sensitive) && !crate::protect::is_encrypted(&draft.value) {
            self.protector.protect(&draft.value)
        } else {
            draft.value.clone()
        }
    }

    /// Add a new entry and save.
    pub fn add(&mut self, draft: EntryDraft) -> Result<Uuid> {
        if self.find(&draft.name).is_some() {
            return Err(KitError::EntryExists(draft.name));
        }

        let mut entry = Entry::new(draft.name.clone(), self.stored_value(&draft));
        entry.description = draft.description;
        entry.kind = draft.kind;
        let id = entry.id;

        let previous = self.checkpoint();
        self.kinds.insert(&entry.kind);
        self.entries.push(entry);
        self.save_or_restore(previous)?;
        Ok(id)
    }

    /// Replace the fields of the entry named `name` and save.
    pub fn edit(&mut self, name: &str, draft: EntryDraft) -> Result<()> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.has_name(name))
            .ok_or_else(|| KitError::EntryNotFound(name.to_string()))?;

        let clash = self
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| i != idx && e.has_name(&draft.name));
        if clash {
            return Err(KitError::EntryExists(draft.name));
        }

        let value = self.stored_value(&draft);
        let previous = self.checkpoint();
        let entry = &mut self.entries[idx];
        entry.name = draft.name;
        entry.value = value;
        entry.description = draft.description;
        entry.kind = draft.kind;
        entry.updated_utc = Utc::now();

        self.kinds.insert(&self.entries[idx].kind);
        self.save_or_restore(previous)
    }

    /// Delete every entry matching one of `names` and save.
    pub fn delete<S: AsRef<str>>(&mut self, names: &[S]) -> Result<usize> {
        let previous = self.checkpoint();
        let before = self.entries.len();
        self.entries
            .retain(|e| !names.iter().any(|n| e.has_name(n.as_ref())));
        let removed = before - self.entries.len();

        if removed == 0 {
            let wanted: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
            return Err(KitError::EntryNotFound(wanted.join(", ")));
        }

        self.kinds = KindSet::from_entries(&self.entries);
        self.save_or_restore(previous)?;
        Ok(removed)
    }

    /// Decoded value of the entry named `name`.
    pub fn reveal(&self, name: &str) -> Result<String> {
        let entry = self
            .find(name)
            .ok_or_else(|| KitError::EntryNotFound(name.to_string()))?;
        Ok(self.protector.unprotect(&entry.value))
    }

    /// Merge entries from a JSON file, matching on name, and save.
    pub fn import(&mut self, path: &Path) -> Result<ImportReport> {
        let json = fs::read_to_string(path).map_err(|source| KitError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let incoming: Vec<Entry> =
            serde_json::from_str(&json).map_err(|source| KitError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let previous = self.checkpoint();
        let mut report = ImportReport::default();
        for mut item in incoming {
            if item.name.trim().is_empty() {
                report.skipped += 1;
                continue;
            }

            if item.was_encrypted == Some(true) && !item.is_encrypted() && !item.value.is_empty() {
                item.value = self.protector.protect(&item.value);
                if item.is_encrypted() {
                    report.reprotected += 1;
                }
            }
            item.was_encrypted = None;

            self.kinds.insert(&item.kind);
            match self.entries.iter_mut().find(|e| e.has_name(&item.name)) {
                Some(existing) => {
                    existing.value = item.value;
                    existing.description = item.description;
                    existing.kind = item.kind;
                    existing.updated_utc = Utc::now();
                    report.updated += 1;
                }
                None => {
                    self.entries.push(item);
                    report.added += 1;
                }
            }
        }

        self.protect_sensitive();
        self.save_or_restore(previous)?;
        info!(?report, "import completed");
        Ok(report)
    }

    /// Write all entries to `path` with protected values decoded and tagged.
    pub fn export(&self, path: &Path) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let exported: Vec<Entry> = self
            .entries
            .iter()
            .map(|entry| {
                if !entry.is_encrypted() {
                    return entry.clone();
                }
                match self.protector.try_unprotect(&entry.value) {
                    Ok(plain) => {
                        report.decoded += 1;
                        Entry {
                            value: plain,
                            was_encrypted: Some(true),
                            ..entry.clone()
                        }
                    }
                    Err(e) => {
                        warn!(name = %entry.name, "exporting value as stored: {e}");
                        report.left_protected += 1;
                        entry.clone()
                    }
                }
            })
            .collect();
        report.exported = exported.len();

        let json = serde_json::to_string_pretty(&exported)?;
        write_atomic(path, json.as_bytes())?;
        info!(?report, path = %path.display(), "export completed");
        Ok(report)
    }
}

/// Drop a leading UTF-8 byte order mark.
fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Write `bytes` to an owner-only temp file beside `path`, then rename it
/// over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let write_err = |source| KitError::WriteFile {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    utils::restrict_to_owner(path);
    Ok(())
}

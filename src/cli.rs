//! Command-line interface implementation.

use crate::classifier::{validate_patterns, SensitivityClassifier};
use crate::crypto::{self, DataProtector, UnavailableProtector};
use crate::error::{KitError, Result};
use crate::filter::{Category, FilterEvent};
use crate::models::EntryDraft;
use crate::protect::SecretProtector;
use crate::security::ClipboardManager;
use crate::service::EntryService;
use crate::settings::AppSettings;
use crate::store::EntryStore;
use crate::utils::{self, success, warning};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::warn;
use zeroize::Zeroize;

/// Keep commands, links and secrets at hand; secrets stay protected at rest.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, global = true, env = "CMDKIT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Data directory, overriding the one in the settings
    #[arg(long, global = true, env = "CMDKIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        short = 'o',
        long,
        global = true,
        value_enum,
        default_value = "text",
        help = "Output format"
    )]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List entries, most recently updated first
    List {
        /// Substring to look for in names and descriptions
        query: Option<String>,

        /// Only show entries of this kind ("All" for every kind)
        #[arg(short, long, default_value = "All")]
        kind: String,
    },

    /// Add a new entry
    Add {
        /// Entry name
        name: String,

        /// Value to store
        #[arg(short, long, conflicts_with = "stdin")]
        value: Option<String>,

        /// Read the value from stdin
        #[arg(short = 'i', long)]
        stdin: bool,

        /// Description of the entry
        #[arg(short, long)]
        description: Option<String>,

        /// Kind of entry (Command, Link, URL, Password, ...)
        #[arg(short, long)]
        kind: Option<String>,

        /// Protect the value even if it does not look sensitive
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Edit an existing entry
    Edit {
        /// Current entry name
        name: String,

        /// New name
        #[arg(short, long)]
        rename: Option<String>,

        /// New value
        #[arg(short, long, conflicts_with = "stdin")]
        value: Option<String>,

        /// Read the new value from stdin
        #[arg(short = 'i', long)]
        stdin: bool,

        /// New description (empty clears it)
        #[arg(short, long)]
        description: Option<String>,

        /// New kind
        #[arg(short, long)]
        kind: Option<String>,

        /// Protect the value even if it does not look sensitive
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Delete one or more entries
    Delete {
        /// Entry names
        #[arg(required = true)]
        names: Vec<String>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the decoded value of an entry
    Show {
        /// Entry name
        name: String,
    },

    /// Copy the decoded value of an entry to the clipboard
    Copy {
        /// Entry name
        name: String,

        /// Clear the clipboard after N seconds
        #[arg(short = 't', long)]
        timeout: Option<u64>,
    },

    /// Merge entries from a JSON file
    Import {
        /// File to import
        file: PathBuf,
    },

    /// Write all entries to a JSON file (protected values in plaintext)
    Export {
        /// Destination file
        file: PathBuf,
    },

    /// List known kinds
    Kinds,

    /// Show or change settings
    Settings {
        /// Add a sensitivity pattern (case-insensitive regex)
        #[arg(long)]
        add_pattern: Vec<String>,

        /// Remove a sensitivity pattern
        #[arg(long)]
        remove_pattern: Vec<String>,

        /// Set the data directory (empty for the default)
        #[arg(long)]
        data_path: Option<String>,
    },
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(AppSettings::default_path)
    }

    fn load_settings(&self) -> AppSettings {
        let mut settings = AppSettings::load(&self.settings_path());
        if let Some(dir) = &self.data_dir {
            settings.data_path = dir.display().to_string();
        }
        settings
    }

    /// Open the entry service on the configured data file.
    fn open_service(&self) -> Result<(EntryService, UnboundedReceiver<FilterEvent>)> {
        let settings = self.load_settings();
        let data_dir = settings.data_dir();
        let backend: Arc<dyn DataProtector> = match crypto::platform_protector(&data_dir) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("protection backend unavailable: {e}");
                warning(&format!(
                    "Protection unavailable ({e}); protected values stay unreadable and new values are stored as entered"
                ));
                Arc::new(UnavailableProtector::new(e.to_string()))
            }
        };
        let protector = SecretProtector::new(backend);
        let classifier = SensitivityClassifier::new(&settings.sensitive_patterns);
        let store = EntryStore::new(settings.data_file(), protector, classifier);

        let (tx, rx) = unbounded_channel();
        let mut service = EntryService::new(store, Arc::new(tx))?;
        if let Err(e) = service.load() {
            warning(&format!("Load data failed: {e}"));
        }
        Ok((service, rx))
    }

    /// Execute the CLI command.
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::List { query, kind } => self.list_entries(query.as_deref(), kind).await,
            Commands::Add {
                name,
                value,
                stdin,
                description,
                kind,
                encrypt,
            } => {
                let mut value = read_value(value.clone(), *stdin)?.unwrap_or_default();
                let draft = EntryDraft::new(
                    name,
                    &value,
                    description.as_deref(),
                    kind.as_deref(),
                    *encrypt,
                );
                value.zeroize();
                let (mut service, _rx) = self.open_service()?;
                service.add(draft?)?;
                success(&format!("Added: {}", name.trim()));
                Ok(())
            }
            Commands::Edit {
                name,
                rename,
                value,
                stdin,
                description,
                kind,
                encrypt,
            } => {
                self.edit_entry(
                    name,
                    rename.as_deref(),
                    read_value(value.clone(), *stdin)?,
                    description.as_deref(),
                    kind.as_deref(),
                    *encrypt,
                )
            }
            Commands::Delete { names, yes } => self.delete_entries(names, *yes),
            Commands::Show { name } => {
                let (service, _rx) = self.open_service()?;
                let mut value = service.reveal(name)?;
                println!("{value}");
                value.zeroize();
                Ok(())
            }
            Commands::Copy { name, timeout } => {
                let (service, _rx) = self.open_service()?;
                let mut value = service.reveal(name)?;
                let result = match timeout {
                    Some(secs) => {
                        success(&format!(
                            "Copied: {name} (will clear in {secs} seconds)"
                        ));
                        ClipboardManager::copy_with_timeout(&value, *secs).await
                    }
                    None => ClipboardManager::copy(&value).map(|_| success(&format!("Copied: {name}"))),
                };
                value.zeroize();
                result
            }
            Commands::Import { file } => {
                let (mut service, _rx) = self.open_service()?;
                let report = service.import(file)?;
                success(&format!(
                    "Import completed: {} added, {} updated. Auto re-encrypted: {}",
                    report.added, report.updated, report.reprotected
                ));
                if report.skipped > 0 {
                    warning(&format!("Skipped {} entries without a name", report.skipped));
                }
                Ok(())
            }
            Commands::Export { file } => {
                let (service, _rx) = self.open_service()?;
                let report = service.export(file)?;
                success(&format!(
                    "Export completed: {} entries (plaintext for portability). Encrypted items tagged with wasEncrypted=true.",
                    report.exported
                ));
                if report.left_protected > 0 {
                    warning(&format!(
                        "{} values could not be decoded and were exported protected",
                        report.left_protected
                    ));
                }
                Ok(())
            }
            Commands::Kinds => {
                let (service, _rx) = self.open_service()?;
                let kinds = service.kinds().suggestions();
                match self.output {
                    OutputFormat::Text => kinds.iter().for_each(|k| println!("{k}")),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&kinds)?),
                }
                Ok(())
            }
            Commands::Settings {
                add_pattern,
                remove_pattern,
                data_path,
            } => self.update_settings(add_pattern, remove_pattern, data_path.as_deref()),
        }
    }

    /// Run one debounced filter pass and print its result.
    async fn list_entries(&self, query: Option<&str>, kind: &str) -> Result<()> {
        let (service, mut rx) = self.open_service()?;
        service.set_query(query.unwrap_or_default(), Category::parse(kind))?;

        let result = loop {
            match rx.recv().await {
                Some(FilterEvent::Published(result)) => break result,
                Some(FilterEvent::Status(status)) => return Err(KitError::Other(status)),
                None => return Err(KitError::Other("filter engine stopped".to_string())),
            }
        };

        match self.output {
            OutputFormat::Text => {
                if result.names.is_empty() {
                    println!("No entries found");
                }
                for name in &result.names {
                    let protected = service
                        .store()
                        .find(name)
                        .is_some_and(|e| e.is_encrypted());
                    if protected {
                        println!("{} {}", name, "[protected]".yellow());
                    } else {
                        println!("{name}");
                    }
                }
                println!("{}", result.status().dimmed());
            }
            OutputFormat::Json => {
                let entries: Vec<serde_json::Value> = result
                    .names
                    .iter()
                    .filter_map(|name| service.store().find(name))
                    .map(|e| {
                        serde_json::json!({
                            "name": e.name,
                            "kind": e.kind,
                            "description": e.description,
                            "protected": e.is_encrypted(),
                            "updatedUtc": e.updated_utc,
                        })
                    })
                    .collect();
                let json = serde_json::json!({
                    "total": result.total,
                    "entries": entries,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Ok(())
    }

    fn edit_entry(
        &self,
        name: &str,
        rename: Option<&str>,
        value: Option<String>,
        description: Option<&str>,
        kind: Option<&str>,
        encrypt: bool,
    ) -> Result<()> {
        let (mut service, _rx) = self.open_service()?;
        let current = service
            .store()
            .find(name)
            .cloned()
            .ok_or_else(|| KitError::EntryNotFound(name.to_string()))?;

        let mut value = match value {
            Some(v) => v,
            None => service.reveal(name)?,
        };
        let draft = EntryDraft::new(
            rename.unwrap_or(&current.name),
            &value,
            description.or(current.description.as_deref()),
            kind.or(Some(current.kind.as_str())),
            encrypt || current.is_encrypted(),
        );
        value.zeroize();

        service.edit(name, draft?)?;
        success(&format!("Updated: {}", rename.unwrap_or(&current.name).trim()));
        Ok(())
    }

    fn delete_entries(&self, names: &[String], yes: bool) -> Result<()> {
        let (mut service, _rx) = self.open_service()?;
        let prompt = match names {
            [single] => format!("Delete this item: {single}?"),
            _ => format!("Delete these {} items?", names.len()),
        };
        if !utils::confirm(&prompt, yes)? {
            return Err(KitError::Cancelled);
        }
        let removed = service.delete(names)?;
        success(&format!("Deleted {removed} entries"));
        Ok(())
    }

    fn update_settings(
        &self,
        add: &[String],
        remove: &[String],
        data_path: Option<&str>,
    ) -> Result<()> {
        let path = self.settings_path();
        let mut settings = AppSettings::load(&path);
        let changed = !add.is_empty() || !remove.is_empty() || data_path.is_some();

        for pattern in add {
            if !settings.sensitive_patterns.contains(pattern) {
                settings.sensitive_patterns.push(pattern.clone());
            }
        }
        settings
            .sensitive_patterns
            .retain(|p| !remove.contains(p));
        if let Some(dir) = data_path {
            settings.data_path = dir.trim().to_string();
        }

        for rejected in validate_patterns(&settings.sensitive_patterns) {
            warning(&format!(
                "Pattern '{}' is not a valid regular expression and will be ignored: {}",
                rejected.pattern, rejected.message
            ));
        }

        if changed {
            settings.save(&path)?;
            success(&format!("Settings saved to {}", path.display()));
        }

        match self.output {
            OutputFormat::Text => {
                println!("{}: {}", "Settings".bold(), path.display());
                println!("{}: {}", "Data file".bold(), settings.data_file().display());
                println!("{}:", "Sensitive patterns".bold());
                for pattern in &settings.sensitive_patterns {
                    println!("  {pattern}");
                }
                for warn in utils::check_file_permissions(&settings.data_file()) {
                    warning(&warn);
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        }
        Ok(())
    }
}

/// Value from `--value` or stdin.
fn read_value(value: Option<String>, stdin: bool) -> Result<Option<String>> {
    if !stdin {
        return Ok(value);
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(Some(buffer.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["cmdkit", "list"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["cmdkit", "list", "deploy", "--kind", "Link"]).unwrap();
        match cli.command {
            Commands::List { query, kind } => {
                assert_eq!(query.as_deref(), Some("deploy"));
                assert_eq!(kind, "Link");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_add_value_conflicts_with_stdin() {
        assert!(Cli::try_parse_from(["cmdkit", "add", "x", "-v", "y", "--stdin"]).is_err());
        assert!(Cli::try_parse_from(["cmdkit", "add", "x", "-v", "y", "-e", "-k", "URL"]).is_ok());
    }

    #[test]
    fn test_delete_requires_names() {
        assert!(Cli::try_parse_from(["cmdkit", "delete"]).is_err());
        assert!(Cli::try_parse_from(["cmdkit", "delete", "a", "b", "-y"]).is_ok());
    }

    #[test]
    fn test_data_dir_overrides_settings() {
        let cli = Cli::try_parse_from([
            "cmdkit",
            "--settings",
            "/nonexistent/settings.json",
            "--data-dir",
            "/srv/kit",
            "kinds",
        ])
        .unwrap();
        let settings = cli.load_settings();
        assert_eq!(settings.data_dir(), PathBuf::from("/srv/kit"));
    }
}

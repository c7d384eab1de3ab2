//! Terminal output and filesystem helpers.

use crate::error::{KitError, Result};
use colored::*;
use std::path::Path;

/// Restrict a file to its owner (0600). No-op off Unix.
pub fn restrict_to_owner(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(path, permissions) {
            tracing::warn!(path = %path.display(), "could not restrict permissions: {e}");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Check file permissions and return warnings.
pub fn check_file_permissions(path: &Path) -> Vec<String> {
    #[allow(unused_mut)]
    let mut warnings = Vec::new();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warnings.push(format!(
                    "File has insecure permissions: {:o}. Run 'chmod 600 {}' to fix.",
                    mode & 0o777,
                    path.display()
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;

    warnings
}

/// Ask for confirmation. Without a terminal, `assume_yes` decides.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !(atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)) {
        return Err(KitError::Other(
            "Confirmation required; re-run with --yes in non-interactive use".to_string(),
        ));
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| KitError::Other(e.to_string()))
}

/// Print an error message and exit.
pub fn error_exit(message: &str, code: i32) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), message);
    std::process::exit(code);
}

/// Print a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_confirm_assume_yes() {
        assert!(confirm("Delete?", true).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_restrict_to_owner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "x").unwrap();
        restrict_to_owner(&path);
        assert!(check_file_permissions(&path).is_empty());
    }
}

//! Clipboard operations for revealed values.

use crate::error::{KitError, Result};
use copypasta::{ClipboardContext, ClipboardProvider};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Clipboard manager for copying entry values.
pub struct ClipboardManager;

impl ClipboardManager {
    /// Copy text, then clear the clipboard after `timeout_secs` if it still
    /// holds our text. Waits for the timeout before returning.
    pub async fn copy_with_timeout(text: &str, timeout_secs: u64) -> Result<()> {
        Self::copy(text)?;

        sleep(Duration::from_secs(timeout_secs)).await;

        if let Ok(current) = Self::get_contents() {
            if current == text {
                Self::clear()?;
                debug!("clipboard cleared after {timeout_secs}s");
            }
        }

        Ok(())
    }

    /// Copy text to clipboard.
    pub fn copy(text: &str) -> Result<()> {
        let mut ctx = ClipboardContext::new().map_err(|_| KitError::ClipboardFailed)?;

        ctx.set_contents(text.to_string())
            .map_err(|_| KitError::ClipboardFailed)?;

        Ok(())
    }

    /// Get clipboard contents.
    pub fn get_contents() -> Result<String> {
        let mut ctx = ClipboardContext::new().map_err(|_| KitError::ClipboardFailed)?;

        ctx.get_contents().map_err(|_| KitError::ClipboardFailed)
    }

    /// Clear clipboard.
    pub fn clear() -> Result<()> {
        Self::copy("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_clipboard_operations() {
        // Needs a desktop session; CI runners usually have none
        if std::env::var("CI").is_ok() {
            return;
        }

        let Ok(()) = ClipboardManager::copy("cmdkit clipboard test") else {
            return;
        };

        if let Ok(content) = ClipboardManager::get_contents() {
            assert_eq!(content, "cmdkit clipboard test");
        }

        assert!(ClipboardManager::clear().is_ok());
    }
}

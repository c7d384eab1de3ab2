//! Main entry point for cmdkit.

use clap::Parser;
use cmdkit::cli::Cli;
use cmdkit::utils::error_exit;

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cmdkit::logging::init();

    if let Err(e) = run().await {
        error_exit(&e.to_string(), 1);
    }
}

/// Runs the parsed command.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.execute().await?;
    Ok(())
}

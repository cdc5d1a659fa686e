#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use crate::commands::export::ExportCommands;
use crate::commands::settings::SettingsCommands;
use crate::commands::suite::SuiteCommands;
use crate::commands::test::TestCommands;
use crate::commands::utils::GlobalOpts;
use pwgen::errors::PwgenError;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "pwgen")]
#[command(about = "Generate Playwright tests from live pages with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding storage.json (defaults to ~/.pwgen)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Browser to inspect pages with
    #[arg(short, long, global = true, default_value = "firefox")]
    browser: String,

    /// WebDriver endpoint (defaults to 4444 for Firefox, 9515 for Chrome)
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    /// Run browser in visible mode (disables headless)
    #[arg(long = "no-headless", global = true)]
    no_headless: bool,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long, global = true)]
    viewport: Option<String>,

    /// Completion request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test for a page
    Generate {
        /// URL of the page under test
        url: String,

        /// Natural-language test case
        instructions: String,

        /// Save the generated test into this suite
        #[arg(long)]
        suite: Option<String>,

        /// Regenerate the test at this index of --suite instead of adding one
        #[arg(long, requires = "suite")]
        test: Option<usize>,

        /// Free-text description stored with the test
        #[arg(long)]
        description: Option<String>,

        /// Capture visible elements of another page as extra context (repeatable)
        #[arg(long)]
        snapshot: Vec<String>,
    },

    /// Manage test suites
    Suite {
        #[command(subcommand)]
        command: SuiteCommands,
    },

    /// Manage stored tests
    Test {
        #[command(subcommand)]
        command: TestCommands,
    },

    /// Export tests and suites
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },

    /// Manage completion provider settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Run one inspector request against a page and print the response
    Inspect {
        /// URL of the page
        url: String,

        /// Request kind (getPageDetails, getVisibleElements, getFullHTML,
        /// getScripts, getStyles, getMetaData)
        #[arg(default_value = "getPageDetails")]
        action: String,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // Convert to our error type to get proper exit code
            let pwgen_err: PwgenError = err.into();

            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": pwgen_err.to_string(),
                "exit_code": pwgen_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", pwgen_err);
            std::process::exit(pwgen_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pwgen=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let opts = GlobalOpts {
        data_dir: cli.data_dir,
        browser: cli.browser,
        webdriver_url: cli.webdriver_url,
        headless: !cli.no_headless,
        viewport: cli.viewport,
        timeout: cli.timeout,
    };

    match cli.command {
        Commands::Generate {
            url,
            instructions,
            suite,
            test,
            description,
            snapshot,
        } => {
            commands::generate::handle_generate(
                &opts,
                url,
                instructions,
                suite,
                test,
                description,
                snapshot,
            )
            .await?
        }
        Commands::Suite { command } => commands::suite::handle_suite(&opts, command).await?,
        Commands::Test { command } => commands::test::handle_test(&opts, command).await?,
        Commands::Export { command } => commands::export::handle_export(&opts, command).await?,
        Commands::Settings { command } => {
            commands::settings::handle_settings(&opts, command).await?
        }
        Commands::Inspect { url, action } => {
            commands::inspect::handle_inspect(&opts, url, action).await?
        }
    }

    Ok(())
}

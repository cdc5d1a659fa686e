use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::utils::{self, GlobalOpts};
use pwgen::bridge::Detached;
use pwgen::errors::PwgenError;
use pwgen::export::{ARCHIVE_NAME, ExportPackager};
use pwgen::orchestrator::GenerationOrchestrator;
use pwgen::types::SuiteId;

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Write one test as a script file
    Test {
        /// Suite id
        suite: String,

        /// Test index
        index: usize,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Zip every test of a suite, one directory per test
    Archive {
        /// Suite id
        suite: String,

        /// Archive path
        #[arg(short, long, default_value = ARCHIVE_NAME)]
        out: PathBuf,

        /// Add metadata.json (description, url, timestamp) next to each test
        #[arg(long)]
        metadata: bool,
    },

    /// Write every test of a suite into a directory
    Dir {
        /// Suite id
        suite: String,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Consolidate a suite into one file through the completion provider
    Suite {
        /// Suite id
        suite: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

pub async fn handle_export(opts: &GlobalOpts, command: ExportCommands) -> Result<()> {
    let backend = utils::open_backend(opts)?;

    match command {
        ExportCommands::Test { suite, index, out } => {
            let store = utils::load_store(backend).await;
            let test = store.test(&SuiteId::from(suite.as_str()), index).ok_or_else(|| {
                PwgenError::InvalidInput(format!("Suite '{}' has no test at index {}", suite, index))
            })?;
            let path = ExportPackager::new().write_test_file(test, &out)?;
            utils::print_json(&json!({ "path": path }))?;
        }
        ExportCommands::Archive {
            suite,
            out,
            metadata,
        } => {
            let store = utils::load_store(backend).await;
            let suite = utils::find_suite(&store, &suite)?;
            let path = ExportPackager::new()
                .with_metadata(metadata)
                .export_archive(&suite.tests, &out)?;
            utils::print_json(&json!({ "path": path, "tests": suite.tests.len() }))?;
        }
        ExportCommands::Dir { suite, out } => {
            let store = utils::load_store(backend).await;
            let suite = utils::find_suite(&store, &suite)?;
            let paths = ExportPackager::new().export_to_directory(&suite.tests, &out)?;
            utils::print_json(&json!({ "paths": paths }))?;
        }
        ExportCommands::Suite { suite, out } => {
            let completion = utils::completion_client(opts, backend.as_ref()).await?;
            let store = utils::load_store(backend).await;
            let suite_id = SuiteId::from(suite.as_str());
            let orchestrator =
                GenerationOrchestrator::new(Arc::new(Detached), Arc::new(completion), store);

            let script = orchestrator.generate_suite(&suite_id).await?;
            let name = orchestrator
                .suite(&suite_id)
                .await
                .map(|s| s.name)
                .unwrap_or_else(|| suite.clone());
            let path = ExportPackager::new().write_suite_file(&name, &script, &out)?;
            utils::print_json(&json!({ "path": path }))?;
        }
    }

    Ok(())
}

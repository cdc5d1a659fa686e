use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::commands::utils::{self, GlobalOpts};
use pwgen::types::{OutputFormat, SuiteConfig, SuiteId};

#[derive(Subcommand)]
pub enum SuiteCommands {
    /// List all suites
    List {
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Show one suite with its tests
    Show {
        /// Suite id
        id: String,
    },

    /// Create a new, empty suite
    Create {
        /// Display name
        name: String,
    },

    /// Rename a suite (blank names are ignored)
    Rename {
        /// Suite id
        id: String,

        /// New display name
        name: String,
    },

    /// Delete a suite and all of its tests
    Delete {
        /// Suite id
        id: String,
    },

    /// Toggle the collapsed flag
    Collapse {
        /// Suite id
        id: String,
    },

    /// Set setup, teardown and import configuration. Omitted options are cleared.
    Config {
        /// Suite id
        id: String,

        /// Code run in test.beforeEach
        #[arg(long)]
        setup: Option<String>,

        /// Code run in test.afterEach
        #[arg(long)]
        teardown: Option<String>,

        /// Newline-delimited import statements
        #[arg(long)]
        imports: Option<String>,

        /// Read the import list from a file instead
        #[arg(long, conflicts_with = "imports")]
        imports_file: Option<PathBuf>,
    },
}

pub async fn handle_suite(opts: &GlobalOpts, command: SuiteCommands) -> Result<()> {
    let backend = utils::open_backend(opts)?;
    let mut store = utils::load_store(backend).await;

    match command {
        SuiteCommands::List { format } => match format {
            OutputFormat::Json => {
                let summary: Vec<_> = store
                    .suites()
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "name": s.name,
                            "tests": s.tests.len(),
                            "collapsed": s.collapsed,
                        })
                    })
                    .collect();
                utils::print_json(&summary)?;
            }
            OutputFormat::Simple => {
                if store.suites().is_empty() {
                    println!("No suites");
                }
                for suite in store.suites() {
                    println!("{}  {} ({} test(s))", suite.id, suite.name, suite.tests.len());
                }
            }
        },
        SuiteCommands::Show { id } => {
            utils::print_json(utils::find_suite(&store, &id)?)?;
        }
        SuiteCommands::Create { name } => {
            let id = store.create_suite(&name).await?;
            utils::print_json(&json!({ "id": id, "name": name.trim() }))?;
        }
        SuiteCommands::Rename { id, name } => {
            let renamed = store.rename_suite(&SuiteId::from(id.as_str()), &name).await?;
            utils::print_json(&json!({ "id": id, "renamed": renamed }))?;
        }
        SuiteCommands::Delete { id } => {
            let removed = store.delete_suite(&SuiteId::from(id.as_str())).await?;
            utils::print_json(&json!({
                "id": id,
                "deleted": true,
                "tests_removed": removed.tests.len(),
            }))?;
        }
        SuiteCommands::Collapse { id } => {
            let collapsed = store.toggle_collapsed(&SuiteId::from(id.as_str())).await?;
            utils::print_json(&json!({ "id": id, "collapsed": collapsed }))?;
        }
        SuiteCommands::Config {
            id,
            setup,
            teardown,
            imports,
            imports_file,
        } => {
            let imports = match imports_file {
                Some(path) => Some(std::fs::read_to_string(&path)?),
                None => imports,
            };
            let config = SuiteConfig {
                setup_code: setup,
                teardown_code: teardown,
                imports,
            };
            store.set_config(&SuiteId::from(id.as_str()), config.clone()).await?;
            utils::print_json(&json!({ "id": id, "config": config }))?;
        }
    }

    Ok(())
}

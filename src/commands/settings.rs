use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use crate::commands::utils::{self, GlobalOpts};
use pwgen::completion::OpenRouterCatalog;
use pwgen::errors::PwgenError;
use pwgen::settings::{AzureConfig, OPENROUTER_API_URL, OpenRouterSettings, Provider};

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show provider settings and which provider is active
    Show,

    /// Update OpenRouter settings
    Set {
        /// OpenRouter API key
        #[arg(long)]
        api_key: Option<String>,

        /// Model id, e.g. openai/gpt-4o
        #[arg(long)]
        model: Option<String>,

        /// Only offer free models in listings
        #[arg(long)]
        free: Option<bool>,

        /// Skip checking the key against OpenRouter
        #[arg(long)]
        no_validate: bool,
    },

    /// Remove the stored OpenRouter settings
    Clear,

    /// List OpenRouter models
    Models {
        /// Only free models (defaults to the stored preference)
        #[arg(long)]
        free: Option<bool>,
    },
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", visible)
}

pub async fn handle_settings(opts: &GlobalOpts, command: SettingsCommands) -> Result<()> {
    let backend = utils::open_backend(opts)?;
    let mut settings = OpenRouterSettings::load(backend.as_ref()).await?;

    match command {
        SettingsCommands::Show => {
            let azure = AzureConfig::from_env();
            let active = Provider::select(&settings, azure.as_ref())
                .map(|p| p.name())
                .ok();
            utils::print_json(&json!({
                "openrouter": {
                    "apiKey": settings.api_key.as_deref().map(mask),
                    "model": settings.model,
                    "free": settings.free,
                },
                "azure": azure.map(|a| json!({
                    "endpoint": a.endpoint,
                    "deployment": a.deployment,
                    "apiVersion": a.api_version,
                })),
                "active": active,
            }))?;
        }
        SettingsCommands::Set {
            api_key,
            model,
            free,
            no_validate,
        } => {
            if let Some(key) = &api_key {
                let key = key.trim();
                if key.is_empty() {
                    return Err(PwgenError::InvalidInput("API key cannot be empty".to_string()).into());
                }
                if !no_validate {
                    OpenRouterCatalog::new(OPENROUTER_API_URL).validate_key(key).await?;
                }
                settings.api_key = Some(key.to_string());
            }
            if let Some(model) = model {
                settings.model = Some(model.trim().to_string());
            }
            if let Some(free) = free {
                settings.free = free;
            }
            settings.save(backend.as_ref()).await?;
            utils::print_json(&json!({ "saved": true, "configured": settings.is_configured() }))?;
        }
        SettingsCommands::Clear => {
            OpenRouterSettings::default().save(backend.as_ref()).await?;
            utils::print_json(&json!({ "cleared": true }))?;
        }
        SettingsCommands::Models { free } => {
            let models = OpenRouterCatalog::new(OPENROUTER_API_URL)
                .list_models(free.unwrap_or(settings.free))
                .await?;
            utils::print_json(&models)?;
        }
    }

    Ok(())
}

//! Completion provider configuration and selection

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::PwgenError;
use crate::storage::KeyValueStore;

/// Storage key of the OpenRouter settings record
pub const OPENROUTER_SETTINGS_KEY: &str = "openRouterSettings";

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

/// User-supplied OpenRouter credentials, persisted alongside suites
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRouterSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Restrict model listings to free models
    #[serde(default)]
    pub free: bool,
}

impl OpenRouterSettings {
    /// Both a key and a model are present and non-blank
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.api_key) && present(&self.model)
    }

    /// Read the settings record; absent or unreadable records yield defaults
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, PwgenError> {
        match store.get(OPENROUTER_SETTINGS_KEY).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    warn!("Ignoring malformed OpenRouter settings: {}", e);
                    Ok(Self::default())
                }
            },
            None => Ok(Self::default()),
        }
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), PwgenError> {
        let value =
            serde_json::to_value(self).map_err(|e| PwgenError::Storage(e.to_string()))?;
        store.set(OPENROUTER_SETTINGS_KEY, value).await?;
        Ok(())
    }
}

/// Built-in Azure OpenAI deployment
#[derive(Debug, Clone, PartialEq)]
pub struct AzureConfig {
    /// Resource name, the `<endpoint>` in `https://<endpoint>.openai.azure.com`
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key: String,
}

impl AzureConfig {
    /// Read `PWGEN_AZURE_ENDPOINT`, `PWGEN_AZURE_DEPLOYMENT`, `PWGEN_AZURE_API_KEY`
    /// and optionally `PWGEN_AZURE_API_VERSION`. Returns `None` unless the
    /// required three are set and non-blank.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let config = AzureConfig {
            endpoint: var("PWGEN_AZURE_ENDPOINT")?,
            deployment: var("PWGEN_AZURE_DEPLOYMENT")?,
            api_key: var("PWGEN_AZURE_API_KEY")?,
            api_version: var("PWGEN_AZURE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
        debug!("Azure OpenAI deployment '{}' configured", config.deployment);
        Some(config)
    }

    pub fn completions_url(&self) -> String {
        format!(
            "https://{}.openai.azure.com/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

/// The completion endpoint chosen for a request
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    OpenRouter {
        base_url: String,
        api_key: String,
        model: String,
    },
    Azure {
        url: String,
        api_key: String,
    },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter { .. } => "openrouter",
            Provider::Azure { .. } => "azure",
        }
    }

    /// OpenRouter wins whenever it has both a key and a model, even if Azure
    /// is configured too. Azure is the fallback; neither is an error.
    pub fn select(
        openrouter: &OpenRouterSettings,
        azure: Option<&AzureConfig>,
    ) -> Result<Provider, PwgenError> {
        if openrouter.is_configured()
            && let (Some(api_key), Some(model)) = (&openrouter.api_key, &openrouter.model)
        {
            return Ok(Provider::OpenRouter {
                base_url: OPENROUTER_API_URL.to_string(),
                api_key: api_key.trim().to_string(),
                model: model.trim().to_string(),
            });
        }
        if let Some(azure) = azure {
            return Ok(Provider::Azure {
                url: azure.completions_url(),
                api_key: azure.api_key.clone(),
            });
        }
        Err(PwgenError::Config(
            "no completion provider configured; set an OpenRouter key and model or PWGEN_AZURE_* variables"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serial_test::serial;

    fn azure() -> AzureConfig {
        AzureConfig {
            endpoint: "acme".into(),
            deployment: "gpt-4o".into(),
            api_version: "2024-02-15-preview".into(),
            api_key: "azure-key".into(),
        }
    }

    fn openrouter(key: Option<&str>, model: Option<&str>) -> OpenRouterSettings {
        OpenRouterSettings {
            api_key: key.map(str::to_string),
            model: model.map(str::to_string),
            free: false,
        }
    }

    #[test]
    fn test_openrouter_wins_when_both_configured() {
        let provider = Provider::select(&openrouter(Some("k"), Some("m")), Some(&azure())).unwrap();
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn test_partial_openrouter_falls_back_to_azure() {
        for settings in [
            openrouter(Some("k"), None),
            openrouter(None, Some("m")),
            openrouter(Some("  "), Some("m")),
        ] {
            let provider = Provider::select(&settings, Some(&azure())).unwrap();
            assert_eq!(
                provider,
                Provider::Azure {
                    url: "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview".into(),
                    api_key: "azure-key".into(),
                }
            );
        }
    }

    #[test]
    fn test_neither_configured_is_config_error() {
        let err = Provider::select(&OpenRouterSettings::default(), None).unwrap_err();
        assert!(matches!(err, PwgenError::Config(_)));
    }

    #[test]
    fn test_openrouter_values_are_trimmed() {
        let provider = Provider::select(&openrouter(Some(" k "), Some(" m ")), None).unwrap();
        assert_eq!(
            provider,
            Provider::OpenRouter {
                base_url: OPENROUTER_API_URL.into(),
                api_key: "k".into(),
                model: "m".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_settings_persist_under_extension_key() {
        let store = MemoryStore::new();
        assert_eq!(OpenRouterSettings::load(&store).await.unwrap(), OpenRouterSettings::default());

        let settings = OpenRouterSettings {
            api_key: Some("k".into()),
            model: Some("m".into()),
            free: true,
        };
        settings.save(&store).await.unwrap();

        let raw = store.get(OPENROUTER_SETTINGS_KEY).await.unwrap().unwrap();
        assert_eq!(raw["apiKey"], "k");
        assert_eq!(raw["free"], true);
        assert_eq!(OpenRouterSettings::load(&store).await.unwrap(), settings);
    }

    #[test]
    #[serial]
    fn test_azure_from_env() {
        // SAFETY: serialized with every other env-mutating test
        unsafe {
            std::env::set_var("PWGEN_AZURE_ENDPOINT", "acme");
            std::env::set_var("PWGEN_AZURE_DEPLOYMENT", "gpt-4o");
            std::env::set_var("PWGEN_AZURE_API_KEY", "secret");
            std::env::remove_var("PWGEN_AZURE_API_VERSION");
        }
        let config = AzureConfig::from_env().unwrap();
        assert_eq!(config.api_version, DEFAULT_AZURE_API_VERSION);
        assert_eq!(config.api_key, "secret");

        unsafe {
            std::env::set_var("PWGEN_AZURE_API_KEY", " ");
        }
        assert!(AzureConfig::from_env().is_none());

        unsafe {
            std::env::remove_var("PWGEN_AZURE_ENDPOINT");
            std::env::remove_var("PWGEN_AZURE_DEPLOYMENT");
            std::env::remove_var("PWGEN_AZURE_API_KEY");
        }
    }
}

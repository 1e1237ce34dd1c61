//! Model catalogs for providers that publish one.

use serde::Deserialize;

use crate::{ProviderError, ProviderKind};

const POLLINATIONS_MODELS_URL: &str = "https://text.pollinations.ai/models";
const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";

/// One catalog row, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct PollinationsModel {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModel {
    id: String,
    #[serde(default)]
    context_length: u64,
}

#[derive(Debug, Deserialize)]
struct OpenRouterCatalog {
    data: Vec<OpenRouterModel>,
}

/// List the models a provider advertises. Ollama manages models locally
/// and phind publishes a fixed set.
pub async fn list_models(
    client: &reqwest::Client,
    kind: &ProviderKind,
) -> Result<Vec<ModelEntry>, ProviderError> {
    match kind {
        ProviderKind::Pollinations => {
            list_pollinations_models(client, POLLINATIONS_MODELS_URL).await
        }
        ProviderKind::OpenRouter => list_openrouter_models(client, OPENROUTER_MODELS_URL).await,
        ProviderKind::Phind => Ok(["Phind-70B", "Phind-34B", "Phind-CodeLlama-34B"]
            .iter()
            .map(|id| ModelEntry {
                id: id.to_string(),
                description: String::new(),
            })
            .collect()),
        other => Err(ProviderError::Unsupported(format!(
            "{other} does not publish a model catalog"
        ))),
    }
}

pub async fn list_pollinations_models(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<ModelEntry>, ProviderError> {
    let models: Vec<PollinationsModel> = fetch_json(client, url).await?;
    Ok(models
        .into_iter()
        .map(|m| ModelEntry {
            id: m.name,
            description: m.description,
        })
        .collect())
}

pub async fn list_openrouter_models(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<ModelEntry>, ProviderError> {
    let catalog: OpenRouterCatalog = fetch_json(client, url).await?;
    Ok(catalog
        .data
        .into_iter()
        .map(|m| ModelEntry {
            description: format!("context={}", m.context_length),
            id: m.id,
        })
        .collect())
}

async fn fetch_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
}

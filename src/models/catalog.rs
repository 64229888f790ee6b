use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::identity::ModelVariant;

/// `GET /models` response from the upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<UpstreamModel>,
    #[serde(default)]
    pub object: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_window_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSupports {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamCapabilities {
    #[serde(default)]
    pub family: String,
    /// Tokenizer family, e.g. `o200k_base`
    #[serde(default)]
    pub tokenizer: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub limits: ModelLimits,
    #[serde(default)]
    pub supports: ModelSupports,
}

/// A model entry as reported by the upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub capabilities: UpstreamCapabilities,
}

/// Find a model by id, falling back to the base model when a variant id
/// (`-fast`, `-1m`) has no entry of its own.
pub fn find_model_with_fallback<'a>(
    model_id: &str,
    models: Option<&'a [UpstreamModel]>,
) -> Option<&'a UpstreamModel> {
    let models = models?;
    if let Some(exact) = models.iter().find(|m| m.id == model_id) {
        return Some(exact);
    }
    let base = ModelVariant::strip_suffix(model_id)?;
    models.iter().find(|m| m.id == base)
}

/// Cached copy of the upstream model list.
#[derive(Default)]
pub struct ModelCatalog {
    models: RwLock<Option<Vec<UpstreamModel>>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, models: Vec<UpstreamModel>) {
        *self.models.write().await = Some(models);
    }

    pub async fn is_loaded(&self) -> bool {
        self.models.read().await.is_some()
    }

    /// Snapshot of the cached list (empty if never loaded)
    pub async fn list(&self) -> Vec<UpstreamModel> {
        self.models.read().await.clone().unwrap_or_default()
    }

    pub async fn find_with_fallback(&self, model_id: &str) -> Option<UpstreamModel> {
        let guard = self.models.read().await;
        find_model_with_fallback(model_id, guard.as_deref()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str) -> UpstreamModel {
        UpstreamModel {
            id: id.to_string(),
            name: id.to_string(),
            vendor: "anthropic".to_string(),
            version: "1".to_string(),
            preview: false,
            capabilities: UpstreamCapabilities {
                family: "claude".to_string(),
                tokenizer: "o200k_base".to_string(),
                kind: "chat".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_exact_match() {
        let models = vec![model("claude-opus-4.6")];
        let found = find_model_with_fallback("claude-opus-4.6", Some(models.as_slice()));
        assert_eq!(found.map(|m| m.id.as_str()), Some("claude-opus-4.6"));
    }

    #[test]
    fn test_variant_falls_back_to_base() {
        let models = vec![model("claude-opus-4.6")];
        for id in ["claude-opus-4.6-fast", "claude-opus-4.6-1m"] {
            let found = find_model_with_fallback(id, Some(models.as_slice()));
            assert_eq!(found.map(|m| m.id.as_str()), Some("claude-opus-4.6"));
        }
    }

    #[test]
    fn test_prefers_exact_variant_entry() {
        let models = vec![model("claude-opus-4.6"), model("claude-opus-4.6-fast")];
        let found = find_model_with_fallback("claude-opus-4.6-fast", Some(models.as_slice()));
        assert_eq!(found.map(|m| m.id.as_str()), Some("claude-opus-4.6-fast"));
    }

    #[test]
    fn test_missing_models() {
        let models = vec![model("claude-opus-4.6")];
        assert!(find_model_with_fallback("unknown-model-fast", Some(models.as_slice())).is_none());
        assert!(find_model_with_fallback("claude-opus-4.6", None).is_none());
    }

    #[test]
    fn test_deserialize_upstream_list() {
        let body = serde_json::json!({
            "object": "list",
            "data": [{
                "id": "gpt-4o",
                "name": "GPT-4o",
                "vendor": "openai",
                "version": "gpt-4o-2024-11-20",
                "preview": false,
                "model_picker_enabled": true,
                "capabilities": {
                    "family": "gpt-4o",
                    "tokenizer": "o200k_base",
                    "type": "chat",
                    "object": "model_capabilities",
                    "limits": {"max_output_tokens": 4096},
                    "supports": {"tool_calls": true, "parallel_tool_calls": true}
                }
            }]
        });
        let parsed: ModelsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.data[0].capabilities.tokenizer, "o200k_base");
        assert_eq!(parsed.data[0].capabilities.limits.max_output_tokens, Some(4096));
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = ModelCatalog::new();
        assert!(!catalog.is_loaded().await);
        assert!(catalog.find_with_fallback("claude-opus-4.6").await.is_none());

        catalog.replace(vec![model("claude-opus-4.6")]).await;
        assert!(catalog.is_loaded().await);
        let found = catalog.find_with_fallback("claude-opus-4.6-1m").await;
        assert_eq!(found.map(|m| m.id), Some("claude-opus-4.6".to_string()));
    }
}

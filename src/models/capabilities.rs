//! Static per-model capability registry.
//!
//! Resolution order for a model id:
//!   1. exact key match
//!   2. longest key that is a prefix of the id (`gpt-5.2-codex-max` → `gpt-5.2-codex`)
//!   3. vendor default for ids starting with a known vendor token
//!   4. empty descriptor (no special handling)

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Xhigh,
}

/// What the gateway needs to know about a model family to shape requests for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Model reasons natively; never send it a default reasoning effort
    pub thinking_mode: bool,
    /// Attach `copilot_cache_control` hints to the system prompt and last tool
    pub enable_cache_control: bool,
    pub default_reasoning_effort: Option<ReasoningEffort>,
    pub supported_reasoning_efforts: Vec<ReasoningEffort>,
    pub supports_tool_choice: Option<bool>,
    pub supports_parallel_tool_calls: Option<bool>,
}

pub struct CapabilityRegistry {
    entries: Vec<(String, ModelCapabilities)>,
    vendor_defaults: Vec<(String, ModelCapabilities)>,
}

static BUILTIN: LazyLock<CapabilityRegistry> = LazyLock::new(CapabilityRegistry::builtin);

impl CapabilityRegistry {
    pub fn new(entries: Vec<(String, ModelCapabilities)>) -> Self {
        Self {
            entries,
            vendor_defaults: Vec::new(),
        }
    }

    pub fn with_vendor_default(mut self, prefix: &str, caps: ModelCapabilities) -> Self {
        self.vendor_defaults.push((prefix.to_string(), caps));
        self
    }

    /// The registry shipped with the proxy, built once per process.
    pub fn shared() -> &'static CapabilityRegistry {
        &BUILTIN
    }

    fn builtin() -> Self {
        use ReasoningEffort::*;

        let claude = |default_effort: Option<ReasoningEffort>, parallel: bool| ModelCapabilities {
            enable_cache_control: true,
            default_reasoning_effort: default_effort,
            supports_tool_choice: Some(false),
            supports_parallel_tool_calls: Some(parallel),
            ..Default::default()
        };
        let gpt = |thinking_mode: bool| ModelCapabilities {
            thinking_mode,
            supports_tool_choice: Some(true),
            supports_parallel_tool_calls: Some(true),
            ..Default::default()
        };
        let codex = |efforts: &[ReasoningEffort]| ModelCapabilities {
            thinking_mode: true,
            default_reasoning_effort: Some(High),
            supported_reasoning_efforts: efforts.to_vec(),
            supports_tool_choice: Some(true),
            supports_parallel_tool_calls: Some(true),
            ..Default::default()
        };
        let mini = ModelCapabilities {
            thinking_mode: true,
            supports_tool_choice: Some(true),
            ..Default::default()
        };

        let entries = vec![
            ("claude-sonnet-4", claude(None, false)),
            ("claude-sonnet-4.5", claude(None, false)),
            ("claude-opus-4.5", claude(None, false)),
            (
                "claude-opus-4.6",
                ModelCapabilities {
                    supported_reasoning_efforts: vec![Low, Medium, High],
                    ..claude(Some(High), true)
                },
            ),
            ("gpt-4o", gpt(false)),
            ("gpt-4.1", gpt(false)),
            ("gpt-5", gpt(true)),
            ("gpt-5.1-codex", codex(&[Low, Medium, High])),
            ("gpt-5.2-codex", codex(&[Low, Medium, High, Xhigh])),
            ("o3-mini", mini.clone()),
            ("o4-mini", mini),
        ];

        Self::new(
            entries
                .into_iter()
                .map(|(id, caps)| (id.to_string(), caps))
                .collect(),
        )
        .with_vendor_default(
            "claude",
            ModelCapabilities {
                enable_cache_control: true,
                supports_tool_choice: Some(false),
                ..Default::default()
            },
        )
    }

    /// Look up capabilities for a model id. Never fails.
    pub fn lookup(&self, model_id: &str) -> ModelCapabilities {
        if let Some((_, caps)) = self.entries.iter().find(|(key, _)| key == model_id) {
            return caps.clone();
        }

        if let Some((_, caps)) = self
            .entries
            .iter()
            .filter(|(key, _)| model_id.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
        {
            return caps.clone();
        }

        self.vendor_defaults
            .iter()
            .find(|(prefix, _)| model_id.starts_with(prefix.as_str()))
            .map(|(_, caps)| caps.clone())
            .unwrap_or_default()
    }

    pub fn is_thinking_mode_model(&self, model_id: &str) -> bool {
        self.lookup(model_id).thinking_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static CapabilityRegistry {
        CapabilityRegistry::shared()
    }

    #[test]
    fn test_opus_4_6_has_cache_control_and_default_effort() {
        let caps = registry().lookup("claude-opus-4.6");
        assert!(caps.enable_cache_control);
        assert_eq!(caps.default_reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(caps.supports_parallel_tool_calls, Some(true));
    }

    #[test]
    fn test_codex_prefix_match_prefers_longest_key() {
        // Both "gpt-5" and "gpt-5.2-codex" are prefixes; the longer one must win
        let caps = registry().lookup("gpt-5.2-codex-max");
        assert!(caps.thinking_mode);
        assert_eq!(caps.default_reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(
            caps.supported_reasoning_efforts,
            vec![
                ReasoningEffort::Low,
                ReasoningEffort::Medium,
                ReasoningEffort::High,
                ReasoningEffort::Xhigh
            ]
        );
    }

    #[test]
    fn test_unknown_model_gets_empty_descriptor() {
        assert_eq!(registry().lookup("unknown-model"), ModelCapabilities::default());
    }

    #[test]
    fn test_unknown_claude_gets_vendor_default() {
        let caps = registry().lookup("claude-unknown");
        assert!(caps.enable_cache_control);
        assert_eq!(caps.supports_tool_choice, Some(false));
        assert_eq!(caps.default_reasoning_effort, None);
    }

    #[test]
    fn test_exact_matches() {
        let sonnet = registry().lookup("claude-sonnet-4");
        assert!(sonnet.enable_cache_control);
        assert_eq!(sonnet.supports_tool_choice, Some(false));
        assert_eq!(sonnet.supports_parallel_tool_calls, Some(false));

        let gpt = registry().lookup("gpt-4o");
        assert_eq!(gpt.supports_tool_choice, Some(true));
        assert_eq!(gpt.supports_parallel_tool_calls, Some(true));
    }

    #[test]
    fn test_is_thinking_mode_model() {
        let r = registry();
        assert!(r.is_thinking_mode_model("gpt-5.2-codex"));
        assert!(r.is_thinking_mode_model("gpt-5"));
        assert!(r.is_thinking_mode_model("o3-mini"));
        assert!(r.is_thinking_mode_model("o4-mini"));
        assert!(!r.is_thinking_mode_model("claude-opus-4.6"));
        assert!(!r.is_thinking_mode_model("gpt-4o"));
        assert!(!r.is_thinking_mode_model("unknown-model"));
    }

    #[test]
    fn test_custom_registry() {
        let registry = CapabilityRegistry::new(vec![(
            "acme-1".to_string(),
            ModelCapabilities {
                enable_cache_control: true,
                ..Default::default()
            },
        )]);
        assert!(registry.lookup("acme-1-large").enable_cache_control);
        assert!(!registry.lookup("claude-sonnet-4").enable_cache_control);
    }
}

//! Model id normalization and serving-variant selection.
//!
//! Clients (Claude Code subagents in particular) send dated or
//! hyphen-versioned ids like `claude-sonnet-4-5-20250929` which the
//! upstream does not know. They are rewritten to the upstream spelling
//! (`claude-sonnet-4.5`), then a variant suffix (`-fast`, `-1m`) is
//! appended when the request asks for one and the model offers it.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::constants::{BETA_CLAUDE_CODE_PREFIX, BETA_CONTEXT_1M, BETA_FAST_MODE};

/// Ordered rewrite rules; the first match wins.
static CANONICAL_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // claude-opus-4-6[-20250514] → claude-opus-4.6
        (r"^(claude-(?:sonnet|opus|haiku)-4)-(5|6)(?:-\d{8,})?$", "$1.$2"),
        (r"^(claude-sonnet-4)-\d{8,}$", "$1"),
        (r"^(claude-opus-4)-\d{8,}$", "$1"),
        (r"^(claude-haiku-4)-\d{8,}$", "$1"),
        (r"^(claude-sonnet-4\.5)-\d{8,}$", "$1"),
        (r"^(claude-opus-4\.5)-\d{8,}$", "$1"),
        (r"^(claude-opus-4\.6)-\d{8,}$", "$1"),
        (r"^(claude-haiku-4\.5)-\d{8,}$", "$1"),
    ]
    .into_iter()
    .map(|(pattern, template)| {
        (
            Regex::new(pattern).expect("canonical model pattern must compile"),
            template,
        )
    })
    .collect()
});

/// Rewrite a client model id to the upstream's canonical spelling.
/// Ids matching no known pattern are returned unchanged.
pub fn canonicalize(model: &str) -> String {
    for (regex, template) in CANONICAL_PATTERNS.iter() {
        if let Some(caps) = regex.captures(model) {
            let mut out = String::new();
            caps.expand(template, &mut out);
            return out;
        }
    }
    model.to_string()
}

/// An alternate serving mode selected by an id suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    Fast,
    Context1m,
}

impl ModelVariant {
    /// Evaluation order when several variant signals are present
    pub const PRIORITY: [ModelVariant; 2] = [ModelVariant::Fast, ModelVariant::Context1m];

    pub fn suffix(self) -> &'static str {
        match self {
            ModelVariant::Fast => "fast",
            ModelVariant::Context1m => "1m",
        }
    }

    fn requested(self, signals: &VariantSignals<'_>) -> bool {
        match self {
            ModelVariant::Fast => {
                signals.speed == Some("fast") || signals.beta.contains(BETA_FAST_MODE)
            }
            ModelVariant::Context1m => signals.beta.contains(BETA_CONTEXT_1M),
        }
    }

    /// Strip a known variant suffix, returning the base id if one was present.
    pub fn strip_suffix(model: &str) -> Option<&str> {
        Self::PRIORITY.iter().find_map(|v| {
            model
                .strip_suffix(v.suffix())
                .and_then(|rest| rest.strip_suffix('-'))
        })
    }
}

/// Canonical model id → variants it can be served as.
pub struct VariantTable {
    entries: HashMap<String, HashSet<ModelVariant>>,
}

static BUILTIN_VARIANTS: LazyLock<VariantTable> = LazyLock::new(|| {
    VariantTable::new([(
        "claude-opus-4.6",
        [ModelVariant::Fast, ModelVariant::Context1m].as_slice(),
    )])
});

impl VariantTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [ModelVariant])>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, variants)| (id.to_string(), variants.iter().copied().collect()))
                .collect(),
        }
    }

    pub fn shared() -> &'static VariantTable {
        &BUILTIN_VARIANTS
    }

    /// Append at most one variant suffix to an already canonical id.
    pub fn resolve(&self, canonical: &str, signals: &VariantSignals<'_>) -> String {
        let Some(variants) = self.entries.get(canonical) else {
            return canonical.to_string();
        };

        ModelVariant::PRIORITY
            .iter()
            .find(|v| variants.contains(*v) && v.requested(signals))
            .map(|v| format!("{canonical}-{}", v.suffix()))
            .unwrap_or_else(|| canonical.to_string())
    }

    /// Canonicalize a raw client id and apply the requested variant.
    pub fn resolve_model(&self, raw: &str, signals: &VariantSignals<'_>) -> String {
        self.resolve(&canonicalize(raw), signals)
    }
}

/// Parsed `anthropic-beta` header: a set of feature tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BetaFeatures(HashSet<String>);

impl BetaFeatures {
    pub fn parse(header: Option<&str>) -> Self {
        Self(
            header
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.0.contains(feature)
    }

    /// True when the request comes from Claude Code, wherever its token sits in the header.
    pub fn is_claude_code(&self) -> bool {
        self.0.iter().any(|f| f.starts_with(BETA_CLAUDE_CODE_PREFIX))
    }
}

/// Request-time inputs that can select a variant.
pub struct VariantSignals<'a> {
    /// The body's `speed` field
    pub speed: Option<&'a str>,
    pub beta: &'a BetaFeatures,
}

/// Copilot API base URL for individual accounts
pub const COPILOT_INDIVIDUAL_URL: &str = "https://api.githubcopilot.com";

/// Copilot API base URL for business accounts
pub const COPILOT_BUSINESS_URL: &str = "https://api.business.githubcopilot.com";

/// Copilot API base URL for enterprise accounts
pub const COPILOT_ENTERPRISE_URL: &str = "https://api.enterprise.githubcopilot.com";

/// Editor version sent when none is configured
pub const DEFAULT_VSCODE_VERSION: &str = "1.104.3";

/// Copilot chat extension version reported upstream
pub const COPILOT_CHAT_VERSION: &str = "0.26.7";

/// Integration id expected by the Copilot API
pub const COPILOT_INTEGRATION_ID: &str = "vscode-chat";

/// GitHub API version header value
pub const GITHUB_API_VERSION: &str = "2025-04-01";

/// User agent string for upstream requests (mimics the Copilot chat extension)
pub const USER_AGENT: &str = "GitHubCopilotChat/0.26.7";

/// `anthropic-beta` token that selects the fast serving variant
pub const BETA_FAST_MODE: &str = "fast-mode-2026-02-01";

/// `anthropic-beta` token that selects the 1M context variant
pub const BETA_CONTEXT_1M: &str = "context-1m-2025-08-07";

/// `anthropic-beta` prefix sent by Claude Code
pub const BETA_CLAUDE_CODE_PREFIX: &str = "claude-code";

/// Tool name prefix used by MCP tools declared through Claude Code
pub const MCP_TOOL_PREFIX: &str = "mcp__";

/// Token count returned when estimation is impossible
pub const PLACEHOLDER_TOKEN_COUNT: u64 = 1;

/// Max characters of a payload dumped at debug level
pub const DEBUG_PAYLOAD_TAIL: usize = 400;

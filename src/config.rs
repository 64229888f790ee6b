use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::constants::{
    COPILOT_BUSINESS_URL, COPILOT_ENTERPRISE_URL, COPILOT_INDIVIDUAL_URL, DEFAULT_VSCODE_VERSION,
};

/// Copilot account type, selects the upstream API host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Individual,
    Business,
    Enterprise,
}

impl AccountType {
    pub fn base_url(self) -> &'static str {
        match self {
            AccountType::Individual => COPILOT_INDIVIDUAL_URL,
            AccountType::Business => COPILOT_BUSINESS_URL,
            AccountType::Enterprise => COPILOT_ENTERPRISE_URL,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "business" => AccountType::Business,
            "enterprise" => AccountType::Enterprise,
            _ => AccountType::Individual,
        }
    }
}

/// CORS configuration mode
#[derive(Debug, Clone)]
pub enum CorsMode {
    /// Only allow localhost origins (default, for local development)
    LocalhostOnly,
    /// Allow all origins
    AllowAll,
    /// Allow specific origins (comma-separated list)
    AllowList(Vec<String>),
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub account_type: AccountType,
    pub copilot_token: Option<String>,
    pub vscode_version: String,
    pub cors_mode: CorsMode,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let host = env::var("COPILOT_PROXY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("COPILOT_PROXY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4141);

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("copilot-proxy");

        let account_type = env::var("COPILOT_PROXY_ACCOUNT_TYPE")
            .map(|v| AccountType::parse(&v))
            .unwrap_or(AccountType::Individual);

        // Token acquisition happens elsewhere; we only pick up what it left behind
        let copilot_token = env::var("COPILOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| read_token_file(&data_dir.join("copilot_token")));

        let vscode_version = env::var("COPILOT_PROXY_VSCODE_VERSION")
            .unwrap_or_else(|_| DEFAULT_VSCODE_VERSION.to_string());

        // CORS configuration: "localhost" (default), "*" (allow all), or comma-separated origins
        let cors_mode = match env::var("COPILOT_PROXY_CORS_ORIGINS").as_deref() {
            Ok("*") => CorsMode::AllowAll,
            Ok(origins) if !origins.is_empty() => {
                CorsMode::AllowList(origins.split(',').map(|s| s.trim().to_string()).collect())
            }
            _ => CorsMode::LocalhostOnly,
        };

        Self {
            host,
            port,
            data_dir,
            account_type,
            copilot_token,
            vscode_version,
            cors_mode,
        }
    }

    pub fn base_url(&self) -> &'static str {
        self.account_type.base_url()
    }
}

fn read_token_file(path: &PathBuf) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let token = content.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

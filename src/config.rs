use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_VERIFY_TOKEN: &str = "my_secret_verify_token_12345";
pub const DEFAULT_APP_SECRET: &str = "your_app_secret_here";

/// Runtime configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WebhookConfig {
    /// Shared secret for the `hub.verify_token` handshake
    #[serde(default = "default_verify_token")]
    pub verify_token: String,
    /// HMAC-SHA256 key for `x-hub-signature-256`
    #[serde(default = "default_app_secret")]
    pub app_secret: String,
    #[serde(default)]
    pub allow_insecure_defaults: bool,
}

/// Shape of the optional `config.toml`. Every section may be omitted.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: Option<ServerConfig>,
    #[serde(default)]
    webhook: Option<WebhookConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_verify_token() -> String {
    DEFAULT_VERIFY_TOKEN.to_string()
}

fn default_app_secret() -> String {
    DEFAULT_APP_SECRET.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_token: default_verify_token(),
            app_secret: default_app_secret(),
            allow_insecure_defaults: false,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            ),
            None => None,
        };

        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Layer defaults, file content and environment lookups.
    /// Split out from `load` so tests don't have to touch the process environment.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match file {
            Some(content) => toml::from_str(content).context("Failed to parse config file")?,
            None => FileConfig::default(),
        };

        let mut config = Config {
            server: file.server.unwrap_or_default(),
            webhook: file.webhook.unwrap_or_default(),
        };

        if let Some(token) = env("VERIFY_TOKEN") {
            config.webhook.verify_token = token;
        }
        if let Some(secret) = env("APP_SECRET") {
            config.webhook.app_secret = secret;
        }
        if let Some(host) = env("HOST") {
            config.server.host = host;
        }
        if let Some(port) = env("PORT") {
            config.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
        }
        if let Some(flag) = env("ALLOW_INSECURE_DEFAULTS") {
            config.webhook.allow_insecure_defaults = parse_flag(&flag);
        }

        Ok(config)
    }

    /// Startup invariant: secrets must be set, and the baked-in defaults are
    /// only accepted when explicitly allowed.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.verify_token.is_empty() {
            anyhow::bail!("VERIFY_TOKEN must not be empty");
        }
        if self.webhook.app_secret.is_empty() {
            anyhow::bail!("APP_SECRET must not be empty");
        }

        let insecure = self.insecure_defaults();
        if !insecure.is_empty() && !self.webhook.allow_insecure_defaults {
            anyhow::bail!(
                "Refusing to start with built-in default secrets ({}). \
                 Set them via environment or config file, or set ALLOW_INSECURE_DEFAULTS=1",
                insecure.join(", ")
            );
        }
        Ok(())
    }

    /// Names of the secrets still at their built-in values.
    pub fn insecure_defaults(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.webhook.verify_token == DEFAULT_VERIFY_TOKEN {
            names.push("VERIFY_TOKEN");
        }
        if self.webhook.app_secret == DEFAULT_APP_SECRET {
            names.push("APP_SECRET");
        }
        names
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

//! Configuration management
//!
//! Server, storage, auth, LLM and scoring settings. Loaded from TOML with
//! environment overrides for secrets and deployment knobs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::scoring::ScoringPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// JWT and password settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// OpenRouter API settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub tutor: TutorConfig,
    /// Difficulty prediction subprocess
    #[serde(default)]
    pub predictor: PredictorConfig,
    /// Justification/keyword backfill
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of the frontend, used to build password reset links
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: default_frontend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("smartskill.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT secret key (auto-generated if not set)
    pub jwt_secret: Option<String>,
    /// Access token expiration (minutes)
    #[serde(default = "default_token_expiry")]
    pub access_token_expiry_minutes: i64,
    /// Refresh token expiration (days)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry_days: i64,
    /// Maximum failed login attempts
    #[serde(default = "default_max_attempts")]
    pub max_login_attempts: u32,
    /// Lockout duration after failed attempts (minutes)
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_minutes: i64,
    /// bcrypt work factor
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Password reset token lifetime (minutes)
    #[serde(default = "default_reset_expiry")]
    pub reset_token_expiry_minutes: i64,
}

fn default_token_expiry() -> i64 {
    60
}

fn default_refresh_expiry() -> i64 {
    7
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> i64 {
    30
}

fn default_bcrypt_cost() -> u32 {
    10
}

fn default_reset_expiry() -> i64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_token_expiry_minutes: default_token_expiry(),
            refresh_token_expiry_days: default_refresh_expiry(),
            max_login_attempts: default_max_attempts(),
            lockout_duration_minutes: default_lockout_duration(),
            bcrypt_cost: default_bcrypt_cost(),
            reset_token_expiry_minutes: default_reset_expiry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Read from `OPENROUTER_API_KEY` when absent from the file
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model for tutoring and content generation
    #[serde(default = "default_model_str")]
    pub default_model: String,
}

fn default_base_url() -> String {
    crate::tutor::llm::OPENROUTER_BASE_URL.to_string()
}

fn default_model_str() -> String {
    "openai/gpt-3.5-turbo".to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_system_prompt() -> String {
    "You are an intelligent tutor that explains coding, logic, and concepts clearly.".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Interpreter used to run the script
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_script")]
    pub script: PathBuf,
    /// Label returned when prediction fails
    #[serde(default = "default_fallback_level")]
    pub fallback: String,
    #[serde(default = "default_predict_timeout")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("predict_difficulty.py")
}

fn default_fallback_level() -> String {
    "Advanced".to_string()
}

fn default_predict_timeout() -> u64 {
    15
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            script: default_script(),
            fallback: default_fallback_level(),
            timeout_secs: default_predict_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Questions processed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Pause after a short batch
    #[serde(default = "default_breather")]
    pub breather_secs: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_max_failures() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    60
}

fn default_breather() -> u64 {
    10
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_consecutive_failures: default_max_failures(),
            retry_delay_secs: default_retry_delay(),
            breather_secs: default_breather(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    #[serde(default = "default_questions_per_quiz")]
    pub questions_per_quiz: usize,
    #[serde(default)]
    pub scoring_policy: ScoringPolicy,
}

fn default_questions_per_quiz() -> usize {
    10
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            questions_per_quiz: default_questions_per_quiz(),
            scoring_policy: ScoringPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP relay that delivers mail; reset links are only logged when unset
    pub webhook_url: Option<String>,
    /// Bearer token for the relay
    #[serde(default, skip_serializing)]
    pub webhook_token: Option<String>,
    #[serde(default = "default_sender")]
    pub from: String,
}

fn default_sender() -> String {
    "no-reply@smartskill.local".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            from: default_sender(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        let parent = path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents).context("Failed to write config file")?;

        Ok(path)
    }

    /// Override settings from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.openrouter.api_key = Some(key.trim().to_string());
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("SMARTSKILL_DATABASE") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(token) = lookup("MAIL_WEBHOOK_TOKEN") {
            self.mail.webhook_token = Some(token);
        }
    }

    /// OpenRouter key, if configured
    pub fn api_key(&self) -> Option<&str> {
        self.openrouter.api_key.as_deref()
    }

    /// Return the configured JWT secret or generate one for this process
    pub fn jwt_secret(&self) -> String {
        self.auth.jwt_secret.clone().unwrap_or_else(|| {
            tracing::warn!("No JWT secret configured; generated one for this run. Tokens will not survive a restart.");
            crate::server::auth::generate_jwt_secret()
        })
    }
}

/// Get the configuration file path (`$SMARTSKILL_CONFIG` wins)
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SMARTSKILL_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let base = directories::ProjectDirs::from("com", "smartskill", "smartskill")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "smartskill", "smartskill")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration file: {}", config_path()?.display());
    println!();
    println!("  Server:          http://{}:{}", config.server.host, config.server.port);
    println!("  Frontend:        {}", config.server.frontend_url);
    println!("  Database:        {}", config.database.path.display());
    println!("  Model:           {}", config.openrouter.default_model);
    println!("  OpenRouter key:  {}", if config.api_key().is_some() { "configured" } else { "missing" });
    println!("  JWT secret:      {}", if config.auth.jwt_secret.is_some() { "configured" } else { "generated per run" });
    println!("  Predictor:       {} {}", config.predictor.program, config.predictor.script.display());
    println!("  Quiz size:       {}", config.quiz.questions_per_quiz);
    println!("  Scoring policy:  {:?}", config.quiz.scoring_policy);
    println!("  Mail relay:      {}", config.mail.webhook_url.as_deref().unwrap_or("log only"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 8080

            [quiz]
            scoring_policy = "partial"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.quiz.questions_per_quiz, 10);
        assert_eq!(config.quiz.scoring_policy, ScoringPolicy::Partial);
        assert_eq!(config.auth.bcrypt_cost, 10);
        assert_eq!(config.predictor.fallback, "Advanced");
        assert_eq!(config.content.batch_size, 50);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", " sk-test "),
            ("PORT", "9000"),
            ("SMARTSKILL_DATABASE", "/tmp/q.db"),
            ("JWT_SECRET", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key(), Some("sk-test"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/q.db"));
        assert_eq!(config.jwt_secret(), "s3cret");
    }

    #[test]
    fn bad_port_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.openrouter.default_model, "openai/gpt-3.5-turbo");
    }

    #[test]
    fn secrets_are_not_written_back() {
        let mut config = Config::default();
        config.openrouter.api_key = Some("sk-secret".into());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("sk-secret"));
    }
}

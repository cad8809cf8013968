use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::admin::AdminCommand;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub edgar: EdgarConfig,
    pub rag: RagConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Chat-completion LLM used for analysis, evaluation and summarization.
/// Any OpenAI-compatible endpoint works (the model field is passed through).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub temperature: f64,
}

/// Grounded-search LLM (Gemini with the google_search tool) used by the
/// response grader when a RAG answer fails validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgarConfig {
    pub user_agent: String,
}

/// Opaque RAG engine connection and on-disk roots. The engine is external;
/// we only know its HTTP endpoint and which provider names it was started
/// with (reported through the status API, never interpreted here).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub endpoint: String,
    pub data_root: String,
    pub system_root: String,
    pub graph_provider: String,
    pub vector_provider: String,
    pub db_provider: String,
    pub timeout_seconds: u64,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "finsight")]
#[command(version, about = "Finsight - Iterative Financial Analysis Engine")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,finsight=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// RAG engine endpoint (overrides config file)
    #[arg(long, value_name = "URL")]
    pub rag_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<AdminCommand>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        // 1. Load from config file (use CLI --config if provided, otherwise find default)
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Override with command line arguments (highest priority)
        config.apply_cli_overrides(cli_args);

        // 4. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT: bind address
    /// - APP_DATABASE_URL: analysis-jobs database URL
    /// - APP_LOG_LEVEL: logging filter (e.g., "info,finsight=debug")
    /// - AGENT_LLM_API_KEY / AGENT_BASE_URL: chat-completion LLM credentials
    /// - GEMINI_API_KEY / GOOGLE_API_KEY: grounded-search LLM credentials
    /// - EDGAR_USER_AGENT: identity sent to the SEC EDGAR API
    /// - COGNEE_DATA_ROOT / COGNEE_SYSTEM_ROOT: RAG engine state directories
    /// - GRAPH_DATABASE_PROVIDER / VECTOR_DB_PROVIDER / DB_PROVIDER: RAG
    ///   engine provider names (informational, passed through to status)
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(key) = std::env::var("AGENT_LLM_API_KEY") {
            self.llm.api_key = Some(key);
            tracing::info!("Override llm.api_key from env");
        }

        if let Ok(base_url) = std::env::var("AGENT_BASE_URL") {
            self.llm.base_url = base_url;
            tracing::info!("Override llm.base_url from env: {}", self.llm.base_url);
        }

        // GEMINI_API_KEY takes precedence over GOOGLE_API_KEY
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.search.api_key = Some(key);
            tracing::info!("Override search.api_key from env (GEMINI_API_KEY)");
        } else if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.search.api_key = Some(key);
            tracing::info!("Override search.api_key from env (GOOGLE_API_KEY)");
        }

        if let Ok(user_agent) = std::env::var("EDGAR_USER_AGENT") {
            self.edgar.user_agent = user_agent;
            tracing::info!("Override edgar.user_agent from env");
        }

        if let Ok(data_root) = std::env::var("COGNEE_DATA_ROOT") {
            self.rag.data_root = data_root;
            tracing::info!("Override rag.data_root from env: {}", self.rag.data_root);
        }

        if let Ok(system_root) = std::env::var("COGNEE_SYSTEM_ROOT") {
            self.rag.system_root = system_root;
            tracing::info!("Override rag.system_root from env: {}", self.rag.system_root);
        }

        if let Ok(provider) = std::env::var("GRAPH_DATABASE_PROVIDER") {
            self.rag.graph_provider = provider;
        }

        if let Ok(provider) = std::env::var("VECTOR_DB_PROVIDER") {
            self.rag.vector_provider = provider;
        }

        if let Ok(provider) = std::env::var("DB_PROVIDER") {
            self.rag.db_provider = provider;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(endpoint) = &args.rag_endpoint {
            self.rag.endpoint = endpoint.clone();
            tracing::info!("Override rag.endpoint from CLI: {}", self.rag.endpoint);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.llm.api_key.is_none() {
            tracing::warn!("AGENT_LLM_API_KEY not set - analysis endpoints will be unavailable");
        }

        if self.search.api_key.is_none() {
            tracing::warn!(
                "No grounded-search API key set (GEMINI_API_KEY / GOOGLE_API_KEY) - \
                 RAG answers will pass through ungraded"
            );
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/finsight.db".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,finsight=debug".to_string(), file: Some("logs/finsight.log".to_string()) }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_seconds: 120,
            temperature: 0.3,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { api_key: None, model: "gemini-2.5-flash".to_string(), timeout_seconds: 60 }
    }
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self { user_agent: "Finsight (demo@example.com)".to_string() }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8765".to_string(),
            data_root: ".cognee_data".to_string(),
            system_root: ".cognee_system".to_string(),
            graph_provider: "networkx".to_string(),
            vector_provider: "lancedb".to_string(),
            db_provider: "sqlite".to_string(),
            timeout_seconds: 180,
        }
    }
}

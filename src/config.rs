use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Deployment environment name, reported verbatim by `/health`
    #[serde(default = "default_environment")]
    pub environment: String,
    pub server: HttpConfig,
    pub lifecycle: LifecycleConfig,
    pub assets: AssetsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Port for the primary listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port used by the last-resort listener when the primary bind fails
    #[serde(default = "default_port")]
    pub fallback_port: u16,

    /// Running on a serverless platform (set when `VERCEL` is present)
    #[serde(default)]
    pub serverless: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Delay between a confirmed listener close and exit code 0
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Hard ceiling after which shutdown exits with code 1
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Upper bound for heavy initialization, 0 disables the bound
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Interval of the uptime log line, 0 disables it
    #[serde(default = "default_health_log_interval_secs")]
    pub health_log_interval_secs: u64,

    /// How many fallback listeners to try after the primary bind fails
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,

    /// Pause between fallback bind attempts
    #[serde(default = "default_fallback_retry_delay_ms")]
    pub fallback_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssetsConfig {
    /// Directory mounted under `/attached_assets`
    #[serde(default = "default_attached_dir")]
    pub attached_dir: String,

    /// Built client bundle served in production
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Client sources served in development
    #[serde(default = "default_dev_dir")]
    pub dev_dir: String,
}

/// Asset serving and fault policy are selected by this, once, at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn from_name(name: &str) -> Self {
        if name == "development" {
            RunMode::Development
        } else {
            RunMode::Production
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, RunMode::Development)
    }
}

/// Process-boundary variables that override every other layer
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    pub port: Option<String>,
    pub node_env: Option<String>,
    pub vercel: bool,
}

impl ProcessEnv {
    pub fn from_process() -> Self {
        Self {
            port: std::env::var("PORT").ok().filter(|p| !p.is_empty()),
            node_env: std::env::var("NODE_ENV").ok().filter(|e| !e.is_empty()),
            vercel: std::env::var_os("VERCEL").is_some(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sandwich.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &ProcessEnv::from_process())
    }

    /// Load configuration from a file, layering the given process variables on top
    pub fn load_with_env<P: AsRef<Path>>(path: P, env: &ProcessEnv) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("environment", default_environment())?
            .set_default("server.port", default_port())?
            .set_default("server.fallback_port", default_port())?
            .set_default("server.serverless", false)?
            .set_default("lifecycle.grace_period_ms", default_grace_period_ms())?
            .set_default("lifecycle.shutdown_timeout_ms", default_shutdown_timeout_ms())?
            .set_default("lifecycle.init_timeout_secs", default_init_timeout_secs())?
            .set_default(
                "lifecycle.health_log_interval_secs",
                default_health_log_interval_secs(),
            )?
            .set_default("lifecycle.fallback_attempts", default_fallback_attempts())?
            .set_default(
                "lifecycle.fallback_retry_delay_ms",
                default_fallback_retry_delay_ms(),
            )?
            .set_default("assets.attached_dir", default_attached_dir())?
            .set_default("assets.static_dir", default_static_dir())?
            .set_default("assets.dev_dir", default_dev_dir())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SANDWICH__ prefix
            .add_source(Environment::with_prefix("SANDWICH").separator("__"))
            .set_override_option("server.port", env.port.clone())?
            .set_override_option("environment", env.node_env.clone())?
            .set_override_option("server.serverless", env.vercel.then_some(true))?
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.trim().is_empty() {
            return Err(ConfigError::Message(
                "Environment name must not be empty".to_string(),
            ));
        }

        if self.lifecycle.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.grace_period_ms >= self.lifecycle.shutdown_timeout_ms {
            return Err(ConfigError::Message(
                "Grace period must be shorter than the shutdown timeout".to_string(),
            ));
        }

        if self.lifecycle.fallback_attempts == 0 {
            return Err(ConfigError::Message(
                "Fallback attempts must be greater than 0".to_string(),
            ));
        }

        let dirs = [
            &self.assets.attached_dir,
            &self.assets.static_dir,
            &self.assets.dev_dir,
        ];
        if dirs.iter().any(|dir| dir.trim().is_empty()) {
            return Err(ConfigError::Message(
                "Asset directories must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_name(&self.environment)
    }

    /// Wildcard address on the configured port. Serverless or not, the
    /// process has to be reachable from outside its container.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.server.port)
    }

    pub fn fallback_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.server.fallback_port)
    }
}

impl LifecycleConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        (self.init_timeout_secs > 0).then(|| Duration::from_secs(self.init_timeout_secs))
    }

    pub fn health_log_interval(&self) -> Option<Duration> {
        (self.health_log_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_log_interval_secs))
    }

    pub fn fallback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_retry_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: HttpConfig {
                port: default_port(),
                fallback_port: default_port(),
                serverless: false,
            },
            lifecycle: LifecycleConfig {
                grace_period_ms: default_grace_period_ms(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
                init_timeout_secs: default_init_timeout_secs(),
                health_log_interval_secs: default_health_log_interval_secs(),
                fallback_attempts: default_fallback_attempts(),
                fallback_retry_delay_ms: default_fallback_retry_delay_ms(),
            },
            assets: AssetsConfig {
                attached_dir: default_attached_dir(),
                static_dir: default_static_dir(),
                dev_dir: default_dev_dir(),
            },
        }
    }
}

// Default value functions
fn default_environment() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_grace_period_ms() -> u64 {
    1000
}
fn default_shutdown_timeout_ms() -> u64 {
    10_000
}
fn default_init_timeout_secs() -> u64 {
    120
}
fn default_health_log_interval_secs() -> u64 {
    300
}
fn default_fallback_attempts() -> u32 {
    2
}
fn default_fallback_retry_delay_ms() -> u64 {
    1000
}

fn default_attached_dir() -> String {
    "attached_assets".to_string()
}
fn default_static_dir() -> String {
    "dist/public".to_string()
}
fn default_dev_dir() -> String {
    "client".to_string()
}

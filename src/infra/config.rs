//! Configuration loading from TOML files

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), port: default_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub user_token: String,
    pub admin_token: String,
    pub metrics_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AfterShipConfig {
    #[serde(default = "default_aftership_base")]
    pub api_base: String,
    pub api_key: String,
    pub webhook_secret: String,
}

fn default_aftership_base() -> String {
    "https://api.aftership.com/tracking/2025-01".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeventeenTrackConfig {
    #[serde(default = "default_seventeen_track_base")]
    pub api_base: String,
    pub api_key: String,
}

fn default_seventeen_track_base() -> String {
    "https://api.17track.net/track/v2.2".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    /// Inbound emails can carry large bodies; cap them rather than buffering
    /// without bound.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self { max_body_bytes: default_max_body_bytes() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub development_endpoint: String,
    pub production_endpoint: String,
    pub api_key: String,
    pub topic: String,
    #[serde(default = "default_push_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_push_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub assistant_id: String,
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_extractor_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_extractor_timeout_secs() -> u64 {
    30
}

fn default_extractor_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_addr")]
    pub addr: String,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    #[serde(default = "default_result_prefix")]
    pub result_prefix: String,
}

fn default_broker_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_task_queue() -> String {
    "celery".to_string()
}

fn default_result_prefix() -> String {
    "celery-task-meta-".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            addr: default_broker_addr(),
            task_queue: default_task_queue(),
            result_prefix: default_result_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_latest_updates_ttl_secs")]
    pub latest_updates_ttl_secs: u64,
    #[serde(default = "default_carrier_ttl_secs")]
    pub carrier_ttl_secs: u64,
}

fn default_latest_updates_ttl_secs() -> u64 {
    300
}

fn default_carrier_ttl_secs() -> u64 {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            latest_updates_ttl_secs: default_latest_updates_ttl_secs(),
            carrier_ttl_secs: default_carrier_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub aftership: AfterShipConfig,
    pub seventeen_track: SeventeenTrackConfig,
    #[serde(default)]
    pub mailgun: MailgunConfig,
    pub push: PushConfig,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind: String,
    port: u16,
    user_token: String,
    admin_token: String,
    metrics_token: String,
    aftership_api_base: String,
    aftership_api_key: String,
    aftership_webhook_secret: String,
    seventeen_track_api_base: String,
    seventeen_track_api_key: String,
    mailgun_max_body_bytes: usize,
    push_development_endpoint: String,
    push_production_endpoint: String,
    push_api_key: String,
    push_topic: String,
    push_timeout_ms: u64,
    extractor_assistant_id: String,
    extractor_timeout_secs: u64,
    extractor_poll_interval_ms: u64,
    broker_addr: String,
    broker_task_queue: String,
    broker_result_prefix: String,
    latest_updates_ttl_secs: u64,
    carrier_ttl_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            user_token: "test-user-token".to_string(),
            admin_token: "test-admin-token".to_string(),
            metrics_token: "test-metrics-token".to_string(),
            aftership_api_base: default_aftership_base(),
            aftership_api_key: "test-api-key".to_string(),
            aftership_webhook_secret: "test-webhook-secret".to_string(),
            seventeen_track_api_base: default_seventeen_track_base(),
            seventeen_track_api_key: "test-api-key".to_string(),
            mailgun_max_body_bytes: default_max_body_bytes(),
            push_development_endpoint: "http://localhost:9100/push".to_string(),
            push_production_endpoint: "http://localhost:9101/push".to_string(),
            push_api_key: "test-push-key".to_string(),
            push_topic: "com.example.parcelgate".to_string(),
            push_timeout_ms: default_push_timeout_ms(),
            extractor_assistant_id: "asst_test".to_string(),
            extractor_timeout_secs: default_extractor_timeout_secs(),
            extractor_poll_interval_ms: default_extractor_poll_interval_ms(),
            broker_addr: default_broker_addr(),
            broker_task_queue: default_task_queue(),
            broker_result_prefix: default_result_prefix(),
            latest_updates_ttl_secs: default_latest_updates_ttl_secs(),
            carrier_ttl_secs: default_carrier_ttl_secs(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            bind: toml_config.server.bind,
            port: toml_config.server.port,
            user_token: toml_config.auth.user_token,
            admin_token: toml_config.auth.admin_token,
            metrics_token: toml_config.auth.metrics_token,
            aftership_api_base: toml_config.aftership.api_base,
            aftership_api_key: toml_config.aftership.api_key,
            aftership_webhook_secret: toml_config.aftership.webhook_secret,
            seventeen_track_api_base: toml_config.seventeen_track.api_base,
            seventeen_track_api_key: toml_config.seventeen_track.api_key,
            mailgun_max_body_bytes: toml_config.mailgun.max_body_bytes,
            push_development_endpoint: toml_config.push.development_endpoint,
            push_production_endpoint: toml_config.push.production_endpoint,
            push_api_key: toml_config.push.api_key,
            push_topic: toml_config.push.topic,
            push_timeout_ms: toml_config.push.timeout_ms,
            extractor_assistant_id: toml_config.extractor.assistant_id,
            extractor_timeout_secs: toml_config.extractor.timeout_secs,
            extractor_poll_interval_ms: toml_config.extractor.poll_interval_ms,
            broker_addr: toml_config.broker.addr,
            broker_task_queue: toml_config.broker.task_queue,
            broker_result_prefix: toml_config.broker.result_prefix,
            latest_updates_ttl_secs: toml_config.cache.latest_updates_ttl_secs,
            carrier_ttl_secs: toml_config.cache.carrier_ttl_secs,
            config_file: path.display().to_string(),
        })
    }

    pub fn bind(&self) -> &str {
        &self.bind
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn metrics_token(&self) -> &str {
        &self.metrics_token
    }

    pub fn aftership_api_base(&self) -> &str {
        &self.aftership_api_base
    }

    pub fn aftership_api_key(&self) -> &str {
        &self.aftership_api_key
    }

    pub fn aftership_webhook_secret(&self) -> &str {
        &self.aftership_webhook_secret
    }

    pub fn seventeen_track_api_base(&self) -> &str {
        &self.seventeen_track_api_base
    }

    pub fn seventeen_track_api_key(&self) -> &str {
        &self.seventeen_track_api_key
    }

    pub fn mailgun_max_body_bytes(&self) -> usize {
        self.mailgun_max_body_bytes
    }

    pub fn push_development_endpoint(&self) -> &str {
        &self.push_development_endpoint
    }

    pub fn push_production_endpoint(&self) -> &str {
        &self.push_production_endpoint
    }

    pub fn push_api_key(&self) -> &str {
        &self.push_api_key
    }

    pub fn push_topic(&self) -> &str {
        &self.push_topic
    }

    pub fn push_timeout_ms(&self) -> u64 {
        self.push_timeout_ms
    }

    pub fn extractor_assistant_id(&self) -> &str {
        &self.extractor_assistant_id
    }

    pub fn extractor_timeout_secs(&self) -> u64 {
        self.extractor_timeout_secs
    }

    pub fn extractor_poll_interval_ms(&self) -> u64 {
        self.extractor_poll_interval_ms
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }

    pub fn broker_task_queue(&self) -> &str {
        &self.broker_task_queue
    }

    pub fn broker_result_prefix(&self) -> &str {
        &self.broker_result_prefix
    }

    pub fn latest_updates_ttl_secs(&self) -> u64 {
        self.latest_updates_ttl_secs
    }

    pub fn carrier_ttl_secs(&self) -> u64 {
        self.carrier_ttl_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

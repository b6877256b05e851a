//! # Configuration Management
//!
//! Loads application configuration from multiple sources in priority order:
//!
//! 1. Environment variables (`APP_` prefix, plus bare deployment keys)
//! 2. Configuration file (`config.toml`, optional)
//! 3. Built-in defaults
//!
//! Absence of any variable or file never prevents startup; the defaults on
//! their own describe a runnable server. Bare keys (`HOST`, `PORT`,
//! `MAX_CONNECTIONS`, `WS_TIMEOUT`, `MAX_AUDIO_SIZE`, `SECRET_KEY`) are
//! recognized for compatibility with common deployment platforms and the
//! historical environment of this service.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub security: SecurityConfig,
}

/// HTTP/WebSocket server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Per-connection and process-wide WebSocket limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Maximum concurrently admitted connections. Attempts beyond this are
    /// closed with a policy-violation code before any message exchange.
    pub max_connections: usize,

    /// Idle timeout in seconds. A connection with no inbound activity for
    /// this long is closed to bound worst-case resource retention.
    pub idle_timeout_secs: u64,

    /// Ceiling on the encoded length of a single audio payload, in bytes.
    pub max_audio_size: usize,

    /// Capacity of the inference dispatch queue. Submissions beyond this
    /// fail fast instead of accumulating unbounded pending work.
    pub inference_queue_depth: usize,
}

/// Expected audio format for inbound payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz. The recognition backend expects 16 kHz mono PCM.
    pub sample_rate: u32,
}

/// Recognition backend description. The core never interprets these values;
/// they are handed to whichever `Recognizer` implementation is wired in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub revision: String,
    pub device: String,
    /// Domain-specific vocabulary hints, comma-separated in the environment.
    pub hotwords: Vec<String>,
}

/// Security-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Present for forward compatibility; not consulted anywhere yet.
    pub secret_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 9999,
            },
            websocket: WebSocketConfig {
                max_connections: 20,
                idle_timeout_secs: 300,
                max_audio_size: 1024 * 1024, // 1 MiB encoded
                inference_queue_depth: 32,
            },
            audio: AudioConfig { sample_rate: 16_000 },
            model: ModelConfig {
                name: "paraformer-zh-streaming".to_string(),
                revision: "v2.0.4".to_string(),
                device: "cpu".to_string(),
                hotwords: Vec::new(),
            },
            security: SecurityConfig {
                secret_key: "change-me-in-production".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment.
    ///
    /// ## Environment examples:
    /// - `APP_SERVER_PORT=8000` (the `APP_` form only reaches single-word
    ///   keys; `_` doubles as the section separator)
    /// - `HOST=0.0.0.0` / `PORT=9999` (deployment-platform shorthand)
    /// - `MAX_CONNECTIONS=50`, `WS_TIMEOUT=120`, `MAX_AUDIO_SIZE=2097152`
    /// - `HOTWORDS=foo,bar`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Bare environment keys used by deployment platforms and by
        // historical deployments of this service.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(max) = env::var("MAX_CONNECTIONS") {
            settings = settings.set_override("websocket.max_connections", max)?;
        }
        if let Ok(timeout) = env::var("WS_TIMEOUT") {
            settings = settings.set_override("websocket.idle_timeout_secs", timeout)?;
        }
        if let Ok(size) = env::var("MAX_AUDIO_SIZE") {
            settings = settings.set_override("websocket.max_audio_size", size)?;
        }
        if let Ok(key) = env::var("SECRET_KEY") {
            settings = settings.set_override("security.secret_key", key)?;
        }
        if let Ok(hotwords) = env::var("HOTWORDS") {
            let words: Vec<String> = hotwords
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
            settings = settings.set_override("model.hotwords", words)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration describes a runnable server.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port cannot be 0"));
        }
        if self.websocket.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.websocket.max_audio_size == 0 {
            return Err(anyhow::anyhow!("max_audio_size must be greater than 0"));
        }
        if self.websocket.inference_queue_depth == 0 {
            return Err(anyhow::anyhow!(
                "inference_queue_depth must be greater than 0"
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("sample_rate must be greater than 0"));
        }
        Ok(())
    }
}

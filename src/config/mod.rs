//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::util::time::DEFAULT_TICK_RATE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Client assets served at `/` when set
    pub static_dir: Option<PathBuf>,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Side length of the square arena
    pub arena_edge: u32,
    /// Half-width in cells of each stamped trail dot
    pub trail_radius: u32,
    /// Spawn RNG seed, random when unset
    pub session_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: "info".to_string(),
            static_dir: None,
            tick_rate: DEFAULT_TICK_RATE,
            arena_edge: 1000,
            trail_radius: 1,
            session_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // PORT wins over SERVER_ADDR, as on most PaaS hosts
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| defaults.server_addr.to_string()),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),

            static_dir: lookup("STATIC_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),

            tick_rate: parse_bounded(&lookup, "TICK_RATE", defaults.tick_rate, 1, 240)?,
            arena_edge: parse_bounded(&lookup, "ARENA_EDGE", defaults.arena_edge, 100, 10_000)?,
            trail_radius: parse_bounded(&lookup, "TRAIL_RADIUS", defaults.trail_radius, 0, 1)?,

            session_seed: match lookup("SESSION_SEED") {
                Some(raw) => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::Invalid("SESSION_SEED", raw))?,
                ),
                None => None,
            },
        })
    }
}

fn parse_bounded<F>(
    lookup: &F,
    key: &'static str,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key, raw.clone()))?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange { key, value, min, max });
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),

    #[error("{key}={value} is outside {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Invalid server address format")]
    InvalidAddress,
}

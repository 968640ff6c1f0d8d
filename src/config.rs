//! # Configuration
//!
//! Environment-based settings shared by the CLI and the web server.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Dashboard configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path of the SQLite review store
    pub db_path: PathBuf,

    /// Server bind address
    pub server_addr: SocketAddr,

    /// Improving/declining slice size for products
    pub top_products: usize,

    /// Improving/declining slice size for categories
    pub top_categories: usize,

    /// Slice size for highest/lowest rated products
    pub top_rated: usize,

    /// Logging level used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("reviews.db"),
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            top_products: 5,
            top_categories: 3,
            top_rated: 5,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    /// Unparseable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            db_path: lookup("REVIEWS_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            server_addr: parse_or(&lookup, "SERVER_ADDR", defaults.server_addr),
            top_products: parse_or(&lookup, "TOP_PRODUCTS", defaults.top_products),
            top_categories: parse_or(&lookup, "TOP_CATEGORIES", defaults.top_categories),
            top_rated: parse_or(&lookup, "TOP_RATED", defaults.top_rated),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Override the store path (CLI `--db`)
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

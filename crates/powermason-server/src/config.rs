//! Server configuration from environment variables.
//!
//!   POWERMASON_JWT_SECRET  - HS256 secret, at least 32 bytes (required)
//!   POWERMASON_BIND_ADDR   - listen address (default: 0.0.0.0:4200)
//!   POWERMASON_MEDIA_ROOT  - uploaded file root (default: ./media)
//!   POWERMASON_STORE       - `postgres` (default) or `memory`
//!
//! Database settings are read by [`powermason_postgres::DatabaseConfig`].

use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("POWERMASON_JWT_SECRET must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("unknown POWERMASON_STORE: {0} (expected postgres or memory)")]
    UnknownStore(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// In-process store; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub bind_addr: String,
    pub media_root: PathBuf,
    pub store: StoreKind,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret =
            lookup("POWERMASON_JWT_SECRET").ok_or(ConfigError::Missing("POWERMASON_JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let store = match lookup("POWERMASON_STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        Ok(Self {
            jwt_secret,
            bind_addr: lookup("POWERMASON_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            media_root: lookup("POWERMASON_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./media")),
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(
        vars: &'a HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let vars = HashMap::from([("POWERMASON_JWT_SECRET", "0123456789abcdef0123456789abcdef")]);
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.media_root, PathBuf::from("./media"));
        assert_eq!(config.store, StoreKind::Postgres);
    }

    #[test]
    fn short_or_missing_secret_is_rejected() {
        let vars = HashMap::new();
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Missing(_))
        ));
        let vars = HashMap::from([("POWERMASON_JWT_SECRET", "short")]);
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::WeakSecret)
        ));
    }

    #[test]
    fn store_kind_is_parsed() {
        let vars = HashMap::from([
            ("POWERMASON_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("POWERMASON_STORE", "memory"),
        ]);
        assert_eq!(
            ServerConfig::from_lookup(lookup(&vars)).unwrap().store,
            StoreKind::Memory
        );
        let vars = HashMap::from([
            ("POWERMASON_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("POWERMASON_STORE", "redis"),
        ]);
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::UnknownStore(_))
        ));
    }
}

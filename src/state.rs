use anyhow::{bail, Context};
use std::{path::PathBuf, str::FromStr, sync::Arc};

use crate::{
    directory::Directory,
    fanout::{Fanout, DEFAULT_CAPACITY},
    message::{MessagingService, ThreadStore},
    notification::{NotificationService, NotificationStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fanout: Fanout,
    pub messaging_service: MessagingService,
    pub notification_service: NotificationService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        threads: Arc<dyn ThreadStore>,
        notifications: Arc<dyn NotificationStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let fanout = Fanout::new(config.fanout_capacity);
        let notification_service = NotificationService::new(notifications);
        let messaging_service = MessagingService::new(
            threads,
            directory,
            notification_service.clone(),
            fanout.clone(),
        );

        Self {
            config,
            fanout,
            messaging_service,
            notification_service,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("unknown STORAGE_BACKEND '{}', expected postgres or memory", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub fanout_capacity: usize,
    pub directory_seed: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let storage_backend = var("STORAGE_BACKEND")
            .map(|v| v.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::Postgres);

        let database_url = var("DATABASE_URL").filter(|v| !v.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set for the postgres backend");
        }

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret: var("JWT_SECRET")
                .filter(|v| !v.is_empty())
                .context("JWT_SECRET must be set")?,
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&var, "PORT", 3000)?,
            fanout_capacity: parse_or(&var, "FANOUT_CAPACITY", DEFAULT_CAPACITY)?,
            directory_seed: var("DIRECTORY_SEED").map(PathBuf::from),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            fanout_capacity: DEFAULT_CAPACITY,
            directory_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.addr(), "127.0.0.1:3000");
        assert_eq!(config.fanout_capacity, 100);
        assert!(config.directory_seed.is_none());
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config = Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "8080"),
            ("DIRECTORY_SEED", "seed.json"),
        ]))
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.port, 8080);
        assert_eq!(config.directory_seed, Some(PathBuf::from("seed.json")));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("STORAGE_BACKEND", "memory")])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "redis"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "eighty"),
        ]))
        .is_err());
    }
}

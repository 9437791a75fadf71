use anyhow::{bail, Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Where profile data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("Unknown STORAGE_BACKEND: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Storage
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // CORS
    pub cors_allow_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Storage
        let storage_backend =
            StorageBackend::parse(&env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".to_string()))?;
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_BACKEND=postgres");
        }
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let run_migrations = env::var("RUN_MIGRATIONS")
            .ok()
            .map(|s| parse_flag(&s))
            .transpose()
            .context("RUN_MIGRATIONS must be true or false")?
            .unwrap_or(true);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Settings {
            env,
            server_addr,
            storage_backend,
            database_url,
            database_max_connections,
            run_migrations,
            cors_allow_origins,
        })
    }

    /// In-memory settings for tests and local runs.
    pub fn for_memory() -> Self {
        Settings {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            run_migrations: false,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a flag: {}", other),
    }
}

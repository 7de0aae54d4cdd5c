use std::{str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

/// Which listeners this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Internal RPC listener and HTTP gateway in one process.
    All,
    /// Internal RPC listener only.
    Rpc,
    /// HTTP gateway only, talking to a remote RPC listener.
    Gateway,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Role::All),
            "rpc" => Ok(Role::Rpc),
            "gateway" => Ok(Role::Gateway),
            other => anyhow::bail!("unknown APP_ROLE {other:?} (expected all, rpc or gateway)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    Memory,
    Postgres,
}

impl FromStr for RevocationBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RevocationBackend::Memory),
            "postgres" | "pg" => Ok(RevocationBackend::Postgres),
            other => anyhow::bail!("unknown REVOCATION_BACKEND {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // argon2 crate defaults (OWASP minimum for argon2id)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub role: Role,
    pub http_host: String,
    pub http_port: u16,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub user_rpc_url: String,
    pub rpc_timeout_ms: u64,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub revocation_backend: RevocationBackend,
    pub revocation_purge_secs: u64,
    pub public_paths: Vec<String>,
}

/// One year.
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

pub const DEFAULT_PUBLIC_PATHS: &[&str] =
    &["/v1/users/signup", "/v1/users/login", "/health", "/metrics"];

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        fn or_default<T: FromStr>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                Some(v) => v
                    .trim()
                    .parse::<T>()
                    .map_err(|e| anyhow::anyhow!("invalid {key}={v:?}: {e}")),
                None => Ok(default),
            }
        }

        let role = or_default(parsed("APP_ROLE"), "APP_ROLE", Role::All)?;
        let rpc_host = parsed("RPC_HOST").unwrap_or_else(|| "127.0.0.1".into());
        let rpc_port = or_default(parsed("RPC_PORT"), "RPC_PORT", 50051u16)?;

        let jwt = JwtConfig {
            secret: parsed("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: parsed("JWT_ISSUER").unwrap_or_else(|| "userhub".into()),
            audience: parsed("JWT_AUDIENCE").unwrap_or_else(|| "userhub-clients".into()),
            ttl_minutes: or_default(parsed("JWT_TTL_MINUTES"), "JWT_TTL_MINUTES", 60)?,
        };
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
        );

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: or_default(
                parsed("PASSWORD_HASH_MEMORY_KIB"),
                "PASSWORD_HASH_MEMORY_KIB",
                defaults.memory_kib,
            )?,
            iterations: or_default(
                parsed("PASSWORD_HASH_ITERATIONS"),
                "PASSWORD_HASH_ITERATIONS",
                defaults.iterations,
            )?,
            parallelism: or_default(
                parsed("PASSWORD_HASH_PARALLELISM"),
                "PASSWORD_HASH_PARALLELISM",
                defaults.parallelism,
            )?,
        };

        let public_paths = match parsed("AUTH_PUBLIC_PATHS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        };

        let cfg = Self {
            role,
            http_host: parsed("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            http_port: or_default(parsed("APP_PORT"), "APP_PORT", 8080u16)?,
            user_rpc_url: parsed("USER_RPC_URL")
                .unwrap_or_else(|| format!("http://{rpc_host}:{rpc_port}")),
            rpc_host,
            rpc_port,
            rpc_timeout_ms: or_default(parsed("RPC_TIMEOUT_MS"), "RPC_TIMEOUT_MS", 3000u64)?,
            database_url: parsed("DATABASE_URL"),
            database_max_connections: or_default(
                parsed("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                10u32,
            )?,
            jwt,
            password,
            revocation_backend: or_default(
                parsed("REVOCATION_BACKEND"),
                "REVOCATION_BACKEND",
                RevocationBackend::Memory,
            )?,
            revocation_purge_secs: or_default(
                parsed("REVOCATION_PURGE_SECS"),
                "REVOCATION_PURGE_SECS",
                60u64,
            )?,
            public_paths,
        };

        if cfg.revocation_backend == RevocationBackend::Postgres {
            anyhow::ensure!(
                cfg.database_url.is_some(),
                "DATABASE_URL must be set for postgres revocation"
            );
        }

        Ok(cfg)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

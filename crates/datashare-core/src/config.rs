//! Configuration module
//!
//! Process-wide configuration for the download and storage subsystem.
//! Loaded once at startup from the environment; the storage strategy is
//! never re-read implicitly mid-request. Admin-triggered reloads go through
//! `Config::reload`, which re-reads and re-validates the environment and
//! returns a fresh value for the caller to swap in atomically.

use std::env;
use std::str::FromStr;

use crate::constants;
use crate::models::storage::{BackendKind, StorageStrategy};

const DEFAULT_PORT: u16 = 4000;

/// Base configuration shared across services.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
}

/// Configuration for the download/storage subsystem.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    // Storage configuration
    pub storage_strategy: StorageStrategy,
    pub local_storage_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, etc.)
    pub s3_endpoint: Option<String>,
    // Download configuration
    pub token_ttl_secs: u64,
    pub session_retention_secs: u64,
    pub session_idle_timeout_secs: u64,
    pub transform_ceiling_bytes: u64,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.base.environment
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
        };

        let storage_strategy = env::var("STORAGE_STRATEGY")
            .ok()
            .map(|s| StorageStrategy::from_str(&s))
            .transpose()?
            .unwrap_or(StorageStrategy::LocalPrimary);

        let config = Config {
            base,
            storage_strategy,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or_else(|| env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            token_ttl_secs: env::var("DOWNLOAD_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| constants::DEFAULT_TOKEN_TTL_SECS.to_string())
                .parse()
                .unwrap_or(constants::DEFAULT_TOKEN_TTL_SECS),
            session_retention_secs: env::var("SESSION_RETENTION_SECS")
                .unwrap_or_else(|_| constants::SESSION_RETENTION_SECS.to_string())
                .parse()
                .unwrap_or(constants::SESSION_RETENTION_SECS),
            session_idle_timeout_secs: env::var("SESSION_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| constants::SESSION_IDLE_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(constants::SESSION_IDLE_TIMEOUT_SECS),
            transform_ceiling_bytes: env::var("TRANSFORM_CEILING_BYTES")
                .unwrap_or_else(|_| constants::DEFAULT_TRANSFORM_CEILING_BYTES.to_string())
                .parse()
                .unwrap_or(constants::DEFAULT_TRANSFORM_CEILING_BYTES),
        };

        config.validate()?;
        Ok(config)
    }

    /// Re-read and re-validate the environment. Invoked only from the admin
    /// reload endpoint; never called implicitly during request handling so a
    /// migration in flight cannot observe a torn strategy.
    pub fn reload() -> Result<Self, anyhow::Error> {
        Self::from_env()
    }

    /// Backends this configuration must be able to construct.
    pub fn required_backends(&self) -> Vec<BackendKind> {
        match self.storage_strategy {
            StorageStrategy::LocalPrimary => vec![BackendKind::Local],
            StorageStrategy::CloudPrimary => vec![BackendKind::S3],
            StorageStrategy::Hybrid | StorageStrategy::Redundant => {
                vec![BackendKind::Local, BackendKind::S3]
            }
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for backend in self.required_backends() {
            match backend {
                BackendKind::Local => {
                    if self.local_storage_path.is_none() {
                        return Err(anyhow::anyhow!(
                            "LOCAL_STORAGE_PATH must be set for storage strategy {}",
                            self.storage_strategy
                        ));
                    }
                }
                BackendKind::S3 => {
                    if self.s3_bucket.is_none() {
                        return Err(anyhow::anyhow!(
                            "S3_BUCKET must be set for storage strategy {}",
                            self.storage_strategy
                        ));
                    }
                    if self.s3_region.is_none() {
                        return Err(anyhow::anyhow!(
                            "S3_REGION or AWS_REGION must be set for storage strategy {}",
                            self.storage_strategy
                        ));
                    }
                }
            }
        }

        if self.token_ttl_secs == 0 {
            return Err(anyhow::anyhow!("DOWNLOAD_TOKEN_TTL_SECS must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        Config {
            base: BaseConfig {
                server_port: 4000,
                cors_origins: vec!["*".to_string()],
                environment: "development".to_string(),
            },
            storage_strategy: StorageStrategy::LocalPrimary,
            local_storage_path: Some("/tmp/datashare".to_string()),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            token_ttl_secs: 3600,
            session_retention_secs: 180,
            session_idle_timeout_secs: 120,
            transform_ceiling_bytes: 1024,
        }
    }

    #[test]
    fn test_local_primary_requires_path() {
        let mut config = local_config();
        assert!(config.validate().is_ok());
        config.local_storage_path = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hybrid_requires_both_backends() {
        let mut config = local_config();
        config.storage_strategy = StorageStrategy::Hybrid;
        assert!(config.validate().is_err());
        config.s3_bucket = Some("datasets".to_string());
        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.required_backends(),
            vec![BackendKind::Local, BackendKind::S3]
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = local_config();
        config.token_ttl_secs = 0;
        assert!(config.validate().is_err());
    }
}

//! Server configuration

use crate::validation::{validate_email, validate_password, ValidationErrors};
use fumode_core::{LimiterConfig, RegistryConfig, ShutdownConfig, TransferConfig};
use fumode_storage::HttpStoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where uploaded images are written
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory, lost on restart
    Memory { bucket: String },
    /// S3-compatible endpoint accepting `PUT {endpoint}/{bucket}/{key}`
    Http {
        endpoint: String,
        bucket: String,
        public_base_url: Option<String>,
        #[serde(skip_serializing)]
        access_token: Option<String>,
    },
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Memory {
            bucket: "fumode".to_string(),
        }
    }
}

impl StorageBackend {
    pub fn bucket(&self) -> &str {
        match self {
            Self::Memory { bucket } | Self::Http { bucket, .. } => bucket,
        }
    }

    pub(crate) fn http_config(&self) -> Option<HttpStoreConfig> {
        match self {
            Self::Memory { .. } => None,
            Self::Http {
                endpoint,
                bucket,
                public_base_url,
                access_token,
            } => {
                let mut config = HttpStoreConfig::new(endpoint.clone(), bucket.clone());
                if let Some(url) = public_base_url {
                    config = config.with_public_base_url(url.clone());
                }
                if let Some(token) = access_token {
                    config = config.with_access_token(token.clone());
                }
                Some(config)
            }
        }
    }
}

/// First admin account, created at startup
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

/// API server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Operating environment (development, staging, production)
    pub env: String,
    /// Per-client token bucket
    pub limiter: LimiterConfig,
    /// Interval between idle-client sweeps (seconds)
    pub sweep_interval_secs: u64,
    /// Idle time after which a client is forgotten (seconds)
    pub stale_after_secs: u64,
    /// Bound on listener close plus background drain (seconds)
    pub shutdown_deadline_secs: u64,
    /// Deadline for a single image upload (seconds)
    pub item_timeout_secs: u64,
    /// Deadline for a whole multi-image upload (seconds)
    pub bulk_deadline_secs: u64,
    /// Cap on concurrent uploads per request; unbounded when unset
    pub max_concurrent_transfers: Option<usize>,
    /// Image storage
    pub storage: StorageBackend,
    /// HMAC secret for issuing and validating tokens
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    /// `iss` claim of issued tokens
    pub jwt_issuer: String,
    /// Admin account to create at startup
    pub admin: Option<AdminSeed>,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Per-request processing timeout (seconds)
    pub request_timeout_secs: u64,
    /// Close connections that send no request head for this long (seconds)
    pub idle_timeout_secs: u64,
    /// Enable permissive CORS
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            env: "development".to_string(),
            limiter: LimiterConfig::default(),
            sweep_interval_secs: 60,
            stale_after_secs: 3 * 60,
            shutdown_deadline_secs: 20,
            item_timeout_secs: 10,
            bulk_deadline_secs: 60,
            max_concurrent_transfers: None,
            storage: StorageBackend::default(),
            jwt_secret: None,
            jwt_issuer: "fumode-api".to_string(),
            admin: None,
            max_body_size: 32 * 1024 * 1024, // 32 MB
            request_timeout_secs: 90,
            idle_timeout_secs: 60,
            cors_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.limiter.validate()?;
        anyhow::ensure!(self.sweep_interval_secs > 0, "sweep interval must be greater than zero");
        anyhow::ensure!(
            self.stale_after_secs >= self.sweep_interval_secs,
            "staleness window must not be shorter than the sweep interval"
        );
        anyhow::ensure!(self.item_timeout_secs > 0, "item timeout must be greater than zero");
        anyhow::ensure!(self.bulk_deadline_secs > 0, "bulk deadline must be greater than zero");
        anyhow::ensure!(
            self.max_concurrent_transfers != Some(0),
            "max concurrent transfers must be greater than zero when set"
        );
        anyhow::ensure!(self.idle_timeout_secs > 0, "idle timeout must be greater than zero");
        if let Some(secret) = &self.jwt_secret {
            anyhow::ensure!(!secret.is_empty(), "JWT secret must not be empty");
        }
        if let Some(admin) = &self.admin {
            let mut v = ValidationErrors::new();
            v.check(!admin.name.is_empty(), "name", "must be provided");
            validate_email(&mut v, &admin.email);
            validate_password(&mut v, &admin.password);
            if let Err(errors) = v.into_result() {
                anyhow::bail!("invalid admin account: {errors}");
            }
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            stale_after: Duration::from_secs(self.stale_after_secs),
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            item_timeout: Duration::from_secs(self.item_timeout_secs),
            max_concurrency: self.max_concurrent_transfers,
        }
    }

    pub fn shutdown_config(&self) -> ShutdownConfig {
        ShutdownConfig {
            deadline: Duration::from_secs(self.shutdown_deadline_secs),
        }
    }

    pub fn bulk_deadline(&self) -> Duration {
        Duration::from_secs(self.bulk_deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
        assert_eq!(config.registry_config().stale_after, Duration::from_secs(180));
        assert_eq!(config.transfer_config().max_concurrency, None);
    }

    #[test]
    fn test_rejects_zero_burst() {
        let mut config = ApiConfig::default();
        config.limiter.burst = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency_cap() {
        let config = ApiConfig {
            max_concurrent_transfers: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_idle_timeout() {
        let config = ApiConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(ApiConfig::default().idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_weak_admin_password() {
        let config = ApiConfig {
            admin: Some(AdminSeed {
                name: "Root".into(),
                email: "root@example.com".into(),
                password: "short".into(),
            }),
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("password"), "{err}");
    }

    #[test]
    fn test_http_backend_config() {
        let backend = StorageBackend::Http {
            endpoint: "https://s3.example.com".into(),
            bucket: "images".into(),
            public_base_url: Some("https://cdn.example.com".into()),
            access_token: Some("s3-token".into()),
        };
        let http = backend.http_config().unwrap();
        assert_eq!(http.bucket, "images");
        assert_eq!(http.public_base_url.as_deref(), Some("https://cdn.example.com"));
        assert_eq!(http.access_token.as_deref(), Some("s3-token"));

        assert!(StorageBackend::default().http_config().is_none());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let config = ApiConfig {
            jwt_secret: Some("hunter22".into()),
            admin: Some(AdminSeed {
                name: "Root".into(),
                email: "root@example.com".into(),
                password: "admin-pa55".into(),
            }),
            storage: StorageBackend::Http {
                endpoint: "https://s3.example.com".into(),
                bucket: "images".into(),
                public_base_url: None,
                access_token: Some("s3-token".into()),
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter22"));
        assert!(!json.contains("s3-token"));
        assert!(!json.contains("admin-pa55"));
        assert!(json.contains("\"kind\":\"http\""));
    }
}

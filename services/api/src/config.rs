//! Server configuration loaded from the environment

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings for the HTTP server and its integrations
///
/// Database and JWT settings are read by `DatabaseConfig` and `JwtConfig`
/// respectively; everything else lives here.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Web client origin, used for CORS and links in emails and checkout
    pub frontend_url: String,
    /// Directory uploaded images are written to and served from
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    /// Behind a reverse proxy that sets `X-Forwarded-For`
    pub trust_proxy: bool,
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_id: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables, with defaults
    ///
    /// # Environment Variables
    /// - `HOST` (default: "0.0.0.0"), `PORT` (default: 3001)
    /// - `FRONTEND_URL` (default: "http://localhost:5173")
    /// - `UPLOAD_DIR` (default: "uploads")
    /// - `MAX_UPLOAD_BYTES` (default: 5 MiB)
    /// - `TRUST_PROXY` (default: false): read client addresses from `X-Forwarded-For`
    /// - `ADMIN_USERNAME`, `ADMIN_EMAIL`, `ADMIN_PASSWORD`: optional admin seed
    /// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `STRIPE_PRICE_ID`: optional billing
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3001)?
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("upload_dir", "uploads")?
            .set_default("max_upload_bytes", 5 * 1024 * 1024)?
            .set_default("trust_proxy", false)?
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Credentials for the seeded super-admin, when all three are set
    pub fn admin_seed(&self) -> Option<(&str, &str, &str)> {
        match (
            self.admin_username.as_deref(),
            self.admin_email.as_deref(),
            self.admin_password.as_deref(),
        ) {
            (Some(username), Some(email), Some(password))
                if !username.is_empty() && !email.is_empty() && !password.is_empty() =>
            {
                Some((username, email, password))
            }
            _ => None,
        }
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl AppConfig {
    /// Configuration for router tests
    pub fn for_tests(upload_dir: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            frontend_url: "http://localhost:5173".to_string(),
            upload_dir: upload_dir.to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
            trust_proxy: false,
            admin_username: None,
            admin_email: None,
            admin_password: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_price_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "PORT",
        "TRUST_PROXY",
        "UPLOAD_DIR",
        "ADMIN_USERNAME",
        "ADMIN_EMAIL",
        "ADMIN_PASSWORD",
    ];

    fn clear() {
        for var in VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.upload_dir, "uploads");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(!config.trust_proxy);
        assert!(config.admin_seed().is_none());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear();
        unsafe {
            std::env::set_var("PORT", "8080");
            std::env::set_var("TRUST_PROXY", "true");
            std::env::set_var("UPLOAD_DIR", "/tmp/pages");
            std::env::set_var("ADMIN_USERNAME", "root");
            std::env::set_var("ADMIN_EMAIL", "root@example.com");
            std::env::set_var("ADMIN_PASSWORD", "changeme1");
        }

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.trust_proxy);
        assert_eq!(config.upload_dir, "/tmp/pages");
        assert_eq!(
            config.admin_seed(),
            Some(("root", "root@example.com", "changeme1"))
        );

        clear();
    }
}

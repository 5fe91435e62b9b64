//! Outbound transactional email
//!
//! Mail is sent through the Resend HTTP API. Sending never blocks the
//! request that triggered it: the call is spawned onto the runtime and any
//! failure is only logged. Without an API key the mailer logs the link it
//! would have sent at debug level instead.

use serde_json::json;
use tracing::{debug, error, info, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Mailer configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Resend API key; `None` disables delivery
    pub api_key: Option<String>,
    /// Sender address
    pub from: String,
    /// Base URL of the web client, used to build links
    pub frontend_url: String,
    /// Provider endpoint
    pub api_url: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RESEND_API_KEY`: provider API key (optional)
    /// - `MAIL_FROM`: sender address (default: "onboarding@resend.dev")
    /// - `FRONTEND_URL`: web client base URL (default: "http://localhost:5173")
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty()),
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "onboarding@resend.dev".to_string()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: RESEND_API_URL.to_string(),
        }
    }
}

/// Fire-and-forget email sender
#[derive(Debug, Clone)]
pub struct Mailer {
    config: MailerConfig,
    client: reqwest::Client,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Self {
        if config.api_key.is_none() {
            warn!("RESEND_API_KEY is not set; emails will only be logged");
        }

        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Mailer that never contacts the provider
    pub fn disabled(frontend_url: &str) -> Self {
        Self {
            config: MailerConfig {
                api_key: None,
                from: "noreply@localhost".to_string(),
                frontend_url: frontend_url.to_string(),
                api_url: RESEND_API_URL.to_string(),
            },
            client: reqwest::Client::new(),
        }
    }

    /// Link the user follows to verify their address
    pub fn verification_link(&self, token: &str) -> String {
        format!(
            "{}/verify-email?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            token
        )
    }

    /// Link the user follows to choose a new password
    pub fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/reset-password?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            token
        )
    }

    pub fn send_verification(&self, to: &str, username: &str, token: &str) {
        let link = self.verification_link(token);
        let html = format!(
            "<p>Hi {},</p><p>Confirm your email address to activate your page:</p>\
             <p><a href=\"{}\">Verify email</a></p>",
            username, link
        );
        self.spawn_send(to, "Verify your email", html, link);
    }

    pub fn send_password_reset(&self, to: &str, username: &str, token: &str) {
        let link = self.reset_link(token);
        let html = format!(
            "<p>Hi {},</p><p>Use the link below to choose a new password. \
             It expires in one hour.</p><p><a href=\"{}\">Reset password</a></p>",
            username, link
        );
        self.spawn_send(to, "Reset your password", html, link);
    }

    fn spawn_send(&self, to: &str, subject: &str, html: String, link: String) {
        let Some(api_key) = self.config.api_key.clone() else {
            info!(to = %to, subject = %subject, "Email delivery disabled");
            debug!(to = %to, link = %link, "Undelivered email link");
            return;
        };

        let client = self.client.clone();
        let url = self.config.api_url.clone();
        let payload = json!({
            "from": self.config.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });
        let to = to.to_string();

        tokio::spawn(async move {
            let result = client
                .post(&url)
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(_) => info!("Email sent to {}", to),
                Err(e) => error!("Failed to send email to {}: {}", to, e),
            }
        });
    }
}

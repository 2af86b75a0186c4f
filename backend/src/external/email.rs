//! Outgoing email
//!
//! The core only needs `(to, subject, html) -> delivered or not`; no stronger
//! delivery guarantee is assumed from the relay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::EmailConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("delivery failed: {0}")]
    Transport(String),
}

/// Sends one HTML email
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError>;
}

/// SMTP relay dispatcher
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpDispatcher {
    pub fn new(config: &EmailConfig, host: &str) -> Result<Self, AppError> {
        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        }
        .map_err(|e| AppError::Configuration(format!("SMTP relay {}: {}", host, e)))?;

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| AppError::Configuration(format!("Invalid from address: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailDispatcher for SmtpDispatcher {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        let to_mailbox = to
            .parse::<Mailbox>()
            .map_err(|_| EmailError::InvalidAddress(to.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        tracing::debug!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured: logs the email and reports success
pub struct LogOnlyDispatcher;

#[async_trait]
impl EmailDispatcher for LogOnlyDispatcher {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        tracing::info!(to = %to, subject = %subject, bytes = html.len(), "SMTP not configured, email logged only");
        Ok(())
    }
}

/// Pick the dispatcher for the configured environment
pub fn build_dispatcher(config: &EmailConfig) -> Result<Arc<dyn EmailDispatcher>, AppError> {
    match config.smtp_host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) => Ok(Arc::new(SmtpDispatcher::new(config, host)?)),
        None => {
            tracing::warn!("No SMTP host configured; supplier emails will only be logged");
            Ok(Arc::new(LogOnlyDispatcher))
        }
    }
}

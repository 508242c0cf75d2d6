//! Outgoing mail.
//!
//! Delivery is delegated to a [`Mailer`]. The sender identity is part of the
//! mailer's configuration, never of the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid mail request: {0}")]
    Invalid(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

/// A plain-text message to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailMessage {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
}

impl MailMessage {
    pub fn validate(&self) -> Result<(), MailError> {
        if self.to.trim().is_empty() || !self.to.contains('@') {
            return Err(MailError::Invalid(format!("bad recipient '{}'", self.to)));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Mailer that records messages in the log instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: Sender,
}

impl LogMailer {
    pub fn new(sender: Sender) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        message.validate()?;
        tracing::info!(
            from = %self.sender.email,
            from_name = %self.sender.name,
            to = %message.to,
            subject = %message.subject,
            "mail accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender {
            email: "alerts@example.org".to_string(),
            name: "Marine Monitor".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_valid_message() {
        let mailer = LogMailer::new(sender());
        let msg = MailMessage {
            to: "ops@example.org".to_string(),
            subject: "Sensor offline".to_string(),
            text: "Tide gauge silent for 2h".to_string(),
        };
        assert!(mailer.send(&msg).await.is_ok());
        assert_eq!(mailer.sender().name, "Marine Monitor");
    }

    #[tokio::test]
    async fn test_log_mailer_rejects_missing_recipient() {
        let mailer = LogMailer::new(sender());
        let msg = MailMessage {
            to: String::new(),
            subject: "x".to_string(),
            text: "y".to_string(),
        };
        assert!(matches!(mailer.send(&msg).await, Err(MailError::Invalid(_))));
    }
}

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// EmailMessage
///
/// A plain-text transactional email. The sender address is filled in by the mailer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail API rejected the message with status {0}")]
    Rejected(u16),
}

// 1. Mailer Contract
/// Mailer
///
/// Outbound email delivery. Handlers only see this trait; the concrete
/// transport is chosen at startup from the configuration.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

// 2. The Real Implementation (HTTP mail API)
/// HttpMailer
///
/// Posts `{from, to, subject, text}` as JSON to a transactional mail API,
/// authenticating with a bearer API key.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&OutgoingMail {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.text,
            })
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// ConsoleMailer
///
/// Local development transport: writes each message to the log instead of sending it.
#[derive(Clone, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "email (console transport)"
        );
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockMailer
///
/// Records every message so tests can pull verification and reset links out of
/// the body. `new_failing` simulates a broken transport.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, address: &str) -> Option<EmailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == address)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Transport("Mock Mailer Error: Simulation requested".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }
}

pub type MailerState = Arc<dyn Mailer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mailer_records_messages() {
        let mailer = MockMailer::new();
        mailer
            .send(EmailMessage {
                to: "a@example.com".into(),
                subject: "Hi".into(),
                text: "body".into(),
            })
            .await
            .unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.last_to("a@example.com").unwrap().subject, "Hi");
        assert!(mailer.last_to("b@example.com").is_none());
    }

    #[tokio::test]
    async fn failing_mock_mailer_errors() {
        let mailer = MockMailer::new_failing();
        let result = mailer
            .send(EmailMessage {
                to: "a@example.com".into(),
                subject: "Hi".into(),
                text: "body".into(),
            })
            .await;
        assert!(result.is_err());
        assert!(mailer.sent().is_empty());
    }
}

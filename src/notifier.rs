//! Out-of-band delivery of activation and password-reset links.
//!
//! Callers treat delivery as best effort: a failed send is logged and never
//! undoes the registration or reset request that triggered it.

use async_trait::async_trait;

use crate::auth::one_time_token::TokenKind;
use crate::email_client::{EmailAddress, EmailClient};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: TokenKind,
    pub recipient: String,
    pub recipient_name: String,
    pub link: String,
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self.kind {
            TokenKind::Activation => "Activate your account",
            TokenKind::PasswordReset => "Reset your password",
        }
    }

    pub fn text_body(&self) -> String {
        match self.kind {
            TokenKind::Activation => format!(
                "Hi {},\nWelcome! Open the link below to activate your account:\n{}",
                self.recipient_name, self.link
            ),
            TokenKind::PasswordReset => format!(
                "Hi {},\nOpen the link below to choose a new password:\n{}\nIf you did not ask for this, ignore this message.",
                self.recipient_name, self.link
            ),
        }
    }

    pub fn html_body(&self) -> String {
        match self.kind {
            TokenKind::Activation => format!(
                "<p>Hi {},</p><p>Welcome! Click <a href=\"{}\">here</a> to activate your account.</p>",
                self.recipient_name, self.link
            ),
            TokenKind::PasswordReset => format!(
                "<p>Hi {},</p><p>Click <a href=\"{}\">here</a> to choose a new password.</p>",
                self.recipient_name, self.link
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Records that a link would have been sent. Used when email is disabled.
///
/// The query string carries the one-time token, so only the path of the link
/// is logged.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

fn link_without_query(link: &str) -> &str {
    link.split('?').next().unwrap_or_default()
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        tracing::info!(
            kind = notification.kind.as_str(),
            recipient = %notification.recipient,
            link = link_without_query(&notification.link),
            "Notification (email disabled)"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailNotifier {
    client: EmailClient,
}

impl EmailNotifier {
    pub fn new(client: EmailClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        let recipient = EmailAddress::parse(&notification.recipient)
            .map_err(|e| AppError::internal(e.to_string()))?;

        self.client
            .send_email(
                &recipient,
                notification.subject(),
                &notification.html_body(),
                &notification.text_body(),
            )
            .await
            .map_err(|e| AppError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::one_time_token::generate_token_value;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    fn notification(kind: TokenKind) -> Notification {
        Notification {
            kind,
            recipient: "alice@x.com".to_string(),
            recipient_name: "Alice".to_string(),
            link: "http://localhost:8000/api/v1/users/activate?token=abc".to_string(),
        }
    }

    #[test]
    fn test_bodies_carry_the_link() {
        for kind in [TokenKind::Activation, TokenKind::PasswordReset] {
            let n = notification(kind);
            assert!(n.text_body().contains(&n.link));
            assert!(n.html_body().contains(&n.link));
        }
        assert_ne!(
            notification(TokenKind::Activation).subject(),
            notification(TokenKind::PasswordReset).subject()
        );
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier
            .notify(&notification(TokenKind::Activation))
            .await
            .is_ok());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_log_notifier_does_not_log_the_token() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let token = generate_token_value();
        let reset = Notification {
            kind: TokenKind::PasswordReset,
            recipient: "alice@x.com".to_string(),
            recipient_name: "Alice".to_string(),
            link: format!("http://h/api/v1/users/reset-password?token={}", token),
        };
        LogNotifier.notify(&reset).await.unwrap();

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("password_reset"));
        assert!(out.contains("/api/v1/users/reset-password"));
        assert!(!out.contains(&token));
    }
}

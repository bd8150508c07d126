//! Outbound notification mail.
//!
//! Delivery happens inside background tasks, so every attempt is bounded by
//! a timeout. A stalled transport cannot hold up shutdown forever.

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::MailerConfig;
use crate::models::User;
use crate::resilience::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn welcome(sender: &str, user: &User) -> Self {
        Self {
            to: user.email.clone(),
            from: sender.to_string(),
            subject: "Welcome to Greenlight!".to_string(),
            body: format!(
                "Hi {},\n\nThanks for signing up for a Greenlight account. \
                 Your user ID number is {}.\n\nThe Greenlight Team",
                user.name, user.id
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },

    #[error("delivery attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Box<MailError> },
}

/// A mail transport.
pub trait Mailer: Send + Sync {
    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), MailError>>;
}

/// Transport that writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            tracing::info!(
                to = %message.to,
                from = %message.from,
                subject = %message.subject,
                "mail delivered to log transport"
            );
            Ok(())
        })
    }
}

/// Deliver `message`, retrying failed or timed out attempts with backoff.
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    message: &Message,
    config: &MailerConfig,
) -> Result<(), MailError> {
    let policy = RetryPolicy::new(
        config.max_attempts.max(1),
        config.retry_delay_ms,
        config.retry_delay_ms.saturating_mul(4),
    );
    let attempt_timeout = Duration::from_secs(config.timeout_secs);

    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(attempt_timeout, mailer.deliver(message)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout(attempt_timeout)),
        };

        let err = match outcome {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        attempt += 1;
        if attempt >= policy.max_attempts {
            return Err(MailError::Exhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }
        tracing::warn!(to = %message.to, attempt, error = %err, "mail delivery failed, retrying");
        tokio::time::sleep(policy.delay_for(attempt)).await;
    }
}

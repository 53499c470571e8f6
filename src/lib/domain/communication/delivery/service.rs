//! Delivery service

use std::{fmt, sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::timeout;

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::{
    email::Email,
    mailer::{Mailer, MailerError},
};

use super::{
    errors::DeliveryError,
    events::{EventLogger, LogFields, SEND_FAILED, SEND_OK, SEND_TIMEOUT},
};

/// How long to wait for the provider when no timeout is configured
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// How long to wait for the provider before reporting a timeout
    pub send_timeout: Duration,

    /// Whether to cancel the in-flight send once the deadline has passed.
    ///
    /// When `false` the send keeps running in the background and may still
    /// deliver the email after the caller was told it timed out.
    pub cancel_on_timeout: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            cancel_on_timeout: false,
        }
    }
}

/// Delivery service
#[async_trait]
pub trait DeliveryService: Clone + Send + Sync + 'static {
    /// Validates an email and hands it to the provider.
    ///
    /// # Arguments
    /// * `email` - The [`Email`] to deliver.
    ///
    /// # Returns
    /// A [`Result`] which is [`Ok`] if the provider accepted the email within
    /// the deadline, or an [`Err`] containing a [`DeliveryError`] saying why
    /// it did not.
    async fn handle(&self, email: Email) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mock! {
    pub DeliveryService {}

    impl Clone for DeliveryService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl DeliveryService for DeliveryService {
        async fn handle(&self, email: Email) -> Result<(), DeliveryError>;
    }
}

/// Delivery service implementation
pub struct DeliveryServiceImpl<M, L>
where
    M: Mailer,
    L: EventLogger,
{
    mailer: Arc<M>,
    logger: Arc<L>,
    config: DeliveryConfig,
}

impl<M, L> DeliveryServiceImpl<M, L>
where
    M: Mailer,
    L: EventLogger,
{
    /// Creates a new delivery service
    pub fn new(mailer: Arc<M>, logger: Arc<L>, config: DeliveryConfig) -> Self {
        Self {
            mailer,
            logger,
            config,
        }
    }

    fn report_failure(&self, error: MailerError, recipients: Vec<String>) -> DeliveryError {
        self.logger.error(
            SEND_FAILED,
            &LogFields::from([("error", json!(error.to_string())), ("to", json!(recipients))]),
        );

        DeliveryError::SendFailed(error)
    }
}

impl<M, L> Clone for DeliveryServiceImpl<M, L>
where
    M: Mailer,
    L: EventLogger,
{
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
            logger: Arc::clone(&self.logger),
            config: self.config,
        }
    }
}

impl<M, L> fmt::Debug for DeliveryServiceImpl<M, L>
where
    M: Mailer,
    L: EventLogger,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryServiceImpl")
            .field("mailer", &"Mailer")
            .field("logger", &"EventLogger")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl<M, L> DeliveryService for DeliveryServiceImpl<M, L>
where
    M: Mailer,
    L: EventLogger,
{
    async fn handle(&self, email: Email) -> Result<(), DeliveryError> {
        email.validate()?;

        let recipients = email.to.clone();
        let mailer = Arc::clone(&self.mailer);

        let send = tokio::spawn(async move { mailer.send(&email).await });
        let abort = send.abort_handle();

        match timeout(self.config.send_timeout, send).await {
            Ok(Ok(Ok(()))) => {
                self.logger
                    .info(SEND_OK, &LogFields::from([("to", json!(recipients))]));

                Ok(())
            }
            Ok(Ok(Err(error))) => Err(self.report_failure(error, recipients)),
            Ok(Err(join_error)) => Err(self.report_failure(
                MailerError::UnknownError(anyhow!("send task failed: {join_error}")),
                recipients,
            )),
            Err(_) => {
                if self.config.cancel_on_timeout {
                    abort.abort();
                }

                self.logger.error(
                    SEND_TIMEOUT,
                    &LogFields::from([
                        ("to", json!(recipients)),
                        ("timeout_ms", json!(millis(self.config.send_timeout))),
                    ]),
                );

                Err(DeliveryError::TimedOut(self.config.send_timeout))
            }
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Delivery errors

use std::time::Duration;

use thiserror::Error;

use crate::domain::communication::{email::EmailValidationError, mailer::MailerError};

/// Errors that can occur when delivering an email
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The email is missing a sender or recipients; nothing was sent
    #[error("invalid email: {0}")]
    Validation(#[from] EmailValidationError),

    /// The provider reported a failure
    #[error("send failed: {0}")]
    SendFailed(#[source] MailerError),

    /// The provider did not answer in time
    #[error("send timed out after {0:?}")]
    TimedOut(Duration),
}

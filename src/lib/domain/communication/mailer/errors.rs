//! Mailer errors

use thiserror::Error;

/// Mailer errors
#[derive(Debug, Error)]
pub enum MailerError {
    /// The provider refused the email
    #[error("provider rejected the email ({status}): {message}")]
    Rejected {
        /// The status code returned by the provider
        status: u16,

        /// The provider's explanation
        message: String,
    },

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

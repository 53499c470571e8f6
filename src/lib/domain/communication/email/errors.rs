//! Email validation errors

use thiserror::Error;

/// Errors raised when an [`Email`](super::Email) is missing a required field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailValidationError {
    /// The sender address is empty
    #[error("from is required")]
    MissingSender,

    /// There are no recipients
    #[error("at least one recipient is required")]
    NoRecipients,
}

//! Outbound email sender port

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::email::Email;

mod errors;

pub use errors::MailerError;

/// Delivers an [`Email`] through an external provider
#[async_trait]
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Send an email
    ///
    /// # Arguments
    /// * `email` - The [`Email`] to hand over to the provider.
    ///
    /// # Returns
    /// A [`Result`] which is [`Ok`] once the provider has accepted the email,
    /// or an [`Err`] containing a [`MailerError`] describing the failure.
    async fn send(&self, email: &Email) -> Result<(), MailerError>;
}

#[cfg(test)]
mock! {
    pub Mailer {}

    impl Clone for Mailer {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl Mailer for Mailer {
        async fn send(&self, email: &Email) -> Result<(), MailerError>;
    }
}

//! The provider-agnostic email entity

use std::collections::HashMap;

mod errors;

pub use errors::EmailValidationError;

/// A file attached to an email
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// The name the file is delivered under
    pub filename: String,

    /// The decoded file contents
    pub content: Vec<u8>,
}

impl Attachment {
    /// Creates a new attachment
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Provider metadata attached to an outgoing email
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    /// Tag name
    pub name: String,

    /// Tag value
    pub value: String,
}

/// A normalized email, ready to be handed to a [`Mailer`](crate::domain::communication::mailer::Mailer)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    /// The envelope sender
    pub from: String,

    /// The envelope recipients, in the order they were given
    pub to: Vec<String>,

    /// Carbon-copy recipients
    pub cc: Vec<String>,

    /// Blind carbon-copy recipients
    pub bcc: Vec<String>,

    /// The `Reply-To` address, if any
    pub reply_to: Option<String>,

    /// The subject line; may be empty
    pub subject: String,

    /// The plain text body
    pub text: Option<String>,

    /// The HTML body
    pub html: Option<String>,

    /// Top-level headers, first occurrence of each name only
    pub headers: HashMap<String, String>,

    /// Attachments, in the order they appear in the message
    pub attachments: Vec<Attachment>,

    /// Provider tags
    pub tags: Vec<Tag>,
}

impl Email {
    /// Creates a new email.
    ///
    /// The sender is trimmed; recipients are trimmed and empty entries are
    /// dropped. Use [`Email::validate`] to check the result.
    pub fn new(
        from: &str,
        to: &[String],
        subject: impl Into<String>,
        text: Option<String>,
        html: Option<String>,
        headers: HashMap<String, String>,
    ) -> Self {
        let to = to
            .iter()
            .map(|recipient| recipient.trim())
            .filter(|recipient| !recipient.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            from: from.trim().to_string(),
            to,
            subject: subject.into(),
            text,
            html,
            headers,
            ..Default::default()
        }
    }

    /// Checks the fields a provider needs to accept the email.
    pub fn validate(&self) -> Result<(), EmailValidationError> {
        if self.from.trim().is_empty() {
            return Err(EmailValidationError::MissingSender);
        }

        if self.to.is_empty() {
            return Err(EmailValidationError::NoRecipients);
        }

        Ok(())
    }

    /// Looks up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

//! SMTP replies

use std::fmt;

use crate::domain::communication::delivery::DeliveryError;

/// A reply sent to the SMTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    /// A single line reply
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![message.into()],
        }
    }

    /// A multi-line reply; every line but the last is sent as a continuation
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply code
    pub fn code(&self) -> u16 {
        self.code
    }

    pub(super) fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{hostname} ESMTP"))
    }

    pub(super) fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub(super) fn start_data() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    pub(super) fn closing(hostname: &str) -> Self {
        Self::new(221, format!("{hostname} closing connection"))
    }

    pub(super) fn unknown_command() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    pub(super) fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }

    pub(super) fn syntax(usage: &str) -> Self {
        Self::new(501, format!("Syntax: {usage}"))
    }

    pub(super) fn bad_sequence(message: &str) -> Self {
        Self::new(503, message)
    }

    pub(super) fn message_too_big() -> Self {
        Self::new(552, "Message exceeds fixed maximum message size")
    }

    /// Maps the outcome of a delivery to the reply for the DATA command
    pub fn delivery(result: &Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => Self::new(250, "OK: message accepted for delivery"),
            Err(DeliveryError::Validation(error)) => {
                Self::new(554, format!("Transaction failed: {error}"))
            }
            Err(DeliveryError::SendFailed(_)) => {
                Self::new(451, "Requested action aborted: delivery failed")
            }
            Err(DeliveryError::TimedOut(_)) => {
                Self::new(451, "Requested action aborted: delivery timed out")
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);

        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            write!(f, "{}{separator}{line}\r\n", self.code)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;

    use crate::domain::communication::{email::EmailValidationError, mailer::MailerError};

    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(Reply::greeting("mx.local").to_string(), "220 mx.local ESMTP\r\n");
    }

    #[test]
    fn test_multiline() {
        let reply = Reply::multiline(
            250,
            vec![
                "mx.local".to_string(),
                "8BITMIME".to_string(),
                "SIZE 1024".to_string(),
            ],
        );

        assert_eq!(
            reply.to_string(),
            "250-mx.local\r\n250-8BITMIME\r\n250 SIZE 1024\r\n"
        );
    }

    #[test]
    fn test_delivery_replies() {
        assert_eq!(Reply::delivery(&Ok(())).code(), 250);
        assert_eq!(
            Reply::delivery(&Err(DeliveryError::Validation(
                EmailValidationError::NoRecipients
            ))),
            Reply::new(554, "Transaction failed: at least one recipient is required")
        );
        assert_eq!(
            Reply::delivery(&Err(DeliveryError::SendFailed(MailerError::UnknownError(
                anyhow!("connection reset")
            ))))
            .code(),
            451
        );
        assert_eq!(
            Reply::delivery(&Err(DeliveryError::TimedOut(Duration::from_secs(15)))).code(),
            451
        );
    }
}

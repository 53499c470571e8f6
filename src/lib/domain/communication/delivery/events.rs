//! Delivery event logging port

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::mock;

/// Structured fields attached to a delivery event
pub type LogFields = BTreeMap<&'static str, serde_json::Value>;

/// The provider accepted the email
pub const SEND_OK: &str = "send_ok";

/// The provider returned an error
pub const SEND_FAILED: &str = "send_failed";

/// The provider did not answer before the deadline
pub const SEND_TIMEOUT: &str = "send_timeout";

/// Receives the outcome of each delivery attempt.
///
/// Implementations are shared between concurrent deliveries.
pub trait EventLogger: Send + Sync + 'static {
    /// Records an informational event
    fn info(&self, event: &str, fields: &LogFields);

    /// Records a failure
    fn error(&self, event: &str, fields: &LogFields);
}

#[cfg(test)]
mock! {
    pub EventLogger {}

    impl EventLogger for EventLogger {
        fn info(&self, event: &str, fields: &LogFields);
        fn error(&self, event: &str, fields: &LogFields);
    }
}

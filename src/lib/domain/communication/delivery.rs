//! Delivery orchestration: validate, send with a deadline, report.

mod errors;
mod events;
mod service;

pub use errors::DeliveryError;
pub use events::{EventLogger, LogFields, SEND_FAILED, SEND_OK, SEND_TIMEOUT};
pub use service::{DeliveryConfig, DeliveryService, DeliveryServiceImpl, DEFAULT_SEND_TIMEOUT};

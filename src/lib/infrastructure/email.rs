//! Outbound email providers

pub mod resend;

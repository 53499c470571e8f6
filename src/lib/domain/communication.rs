//! Email intake and delivery

pub mod delivery;
pub mod email;
pub mod mailer;
pub mod mime;

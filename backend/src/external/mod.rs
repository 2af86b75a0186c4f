//! External service integrations

pub mod email;

pub use email::{build_dispatcher, EmailDispatcher, EmailError, LogOnlyDispatcher, SmtpDispatcher};

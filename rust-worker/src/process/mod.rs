//! Inbound message processing.
//!
//! ```text
//! raw RFC 5322 message → extract_email() → EmailRecord → queue
//! ```

pub mod email_parser;

pub use email_parser::extract_email;

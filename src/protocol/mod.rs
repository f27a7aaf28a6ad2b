//! Wire protocol shared by the dispatcher and the command path
//!
//! Devices speak one of two dialects:
//! - structured: a JSON [`Envelope`] on fixed `device/...` topics
//! - legacy: a bare text payload on `{prefix}/{family}/{action}` topics

pub mod envelope;
pub mod topics;

pub use envelope::Envelope;
pub use topics::TopicConfig;

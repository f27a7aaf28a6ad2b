//! Device presence registry
//!
//! Devices announce themselves over the transport, report status and
//! heartbeats, and are aged out by the presence sweep when they go quiet

pub mod command;
pub mod presence;
pub mod registry;
pub mod types;

pub use command::CommandSender;
pub use presence::{PresencePolicy, spawn_sweep};
pub use registry::DeviceRegistry;
pub use types::{Device, StatusUpdate, SweepReport};

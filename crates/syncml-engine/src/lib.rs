//! OMA DS (SyncML DS) 1.1/1.2 protocol engine.
//!
//! The engine is a single-task cooperative state machine: inbound messages
//! advance a [`session::SessionHandler`], which stages storage mutations,
//! resolves conflicts, and queues outbound packages that the response
//! generator drains into size-bounded messages. Transport and persistence
//! are injected through the traits in [`transport`] and [`persist`].

pub mod agent;
pub mod auth;
pub mod command;
pub mod config;
pub mod conflict;
pub mod devinf;
pub mod error;
pub mod item;
pub mod observer;
pub mod packages;
pub mod persist;
pub mod response;
pub mod session;
pub mod storage;
pub mod target;
pub mod transport;
pub mod types;

pub use agent::{SyncAgent, SyncOutcome};
pub use config::{AgentProperties, SyncConfig};
pub use error::SyncError;
pub use observer::SyncObserver;
pub use session::{ServerAlertedStart, SessionHandler, SessionStep};
pub use types::{AuthType, ConflictPolicy, Role, SyncState};

pub use syncml_wire::{ProtocolVersion, SyncDirection, SyncInitiator, SyncMode, SyncType};

#![forbid(unsafe_code)]

//! Client-side real-time synchronization engine for the parley
//! messenger: reconciles REST-fetched history with realtime deltas,
//! manages typing presence, aggregates notifications for background
//! chats and drives the attachment-upload and message-compose
//! lifecycle. The read-only admin monitor reuses the same registry and
//! store without compose or typing capability.

pub mod admin;
pub mod client;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod registry;
pub mod services;
pub mod session;
pub mod store;
pub mod typing;
pub mod upload;

pub use admin::AdminMonitor;
pub use client::ChatClient;
pub use composer::SendPhase;
pub use config::ClientConfig;
pub use engine::{Action, Engine, PostTicket};
pub use error::ClientError;
pub use notifications::NotificationEntry;
pub use services::{ChatApi, Clock, SharedApi, SharedClock, SystemClock};
pub use session::SessionContext;
pub use store::{FetchOutcome, FetchTicket};
pub use upload::{PreviewKind, UploadStatus, UploadTask};

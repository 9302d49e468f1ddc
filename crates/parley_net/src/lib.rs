#![forbid(unsafe_code)]

pub mod reconnect;
pub mod rest;
pub mod socket;

pub use rest::{ApiClient, ApiError, FileSource};
pub use socket::{SocketConfig, SocketHandle, SocketSubscription};

#![forbid(unsafe_code)]

use parley_net::ApiError;

/// Errors surfaced by the client core.
///
/// Only `AuthMissing` is fatal to the session. REST failures are
/// transient and locally recovered; stale fetch responses and duplicate
/// realtime deliveries are absorbed silently and never reach this enum.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// No bearer token present. Fatal to the session.
	#[error("no auth token present")]
	AuthMissing,

	/// Operation requires the admin role.
	#[error("admin role required")]
	AdminRequired,

	/// REST call failed; the operation is abandoned, not retried.
	#[error(transparent)]
	Api(#[from] ApiError),

	/// Compose requires non-empty content or an attachment.
	#[error("message needs content or an attachment")]
	EmptyMessage,

	/// At most one upload may be in flight per compose session.
	#[error("an upload is already in flight")]
	UploadInFlight,

	#[error("invalid group: {0}")]
	InvalidGroup(String),
}

#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown role: {0}")]
	UnknownRole(String),
}

/// Server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	/// Create a non-empty `UserId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		UserId::new(s.to_string())
	}
}

/// Server-assigned chat identifier. Doubles as the realtime room key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
	/// Create a non-empty `ChatId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for ChatId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for ChatId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ChatId::new(s.to_string())
	}
}

/// Message identifier. Server-assigned once acknowledged; locally
/// generated (uuid v4) while a message is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	/// Create a non-empty `MessageId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	/// Generate a local id for an optimistic pending message.
	pub fn new_local() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for MessageId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MessageId::new(s.to_string())
	}
}

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Admin,
}

impl Role {
	pub const fn as_str(self) -> &'static str {
		match self {
			Role::User => "user",
			Role::Admin => "admin",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		match s.to_ascii_lowercase().as_str() {
			"user" => Ok(Role::User),
			"admin" => Ok(Role::Admin),
			other => Err(ParseIdError::UnknownRole(other.to_string())),
		}
	}
}

/// Bearer token wrapper that redacts in logs and never serializes its value.
#[derive(Clone)]
pub struct SecretToken(String);

impl SecretToken {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner token.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretToken(<redacted>)")
	}
}

impl fmt::Display for SecretToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl serde::Serialize for SecretToken {
	fn serialize<S>(&self, serializer: S) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("")
	}
}

impl<'de> serde::Deserialize<'de> for SecretToken {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretToken::new(s))
	}
}

/// The authenticated identity of a session (end-user or admin).
#[derive(Debug, Clone)]
pub struct Identity {
	pub id: UserId,
	pub display_name: String,
	pub avatar_url: Option<String>,
	pub token: SecretToken,
	pub role: Role,
}

/// A chat participant as embedded in chat/message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
	pub id: UserId,
	pub display_name: String,
	#[serde(default)]
	pub avatar_url: Option<String>,
}

/// Chat kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
	Direct,
	Group,
}

/// A conversation visible to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
	pub id: ChatId,

	pub kind: ChatKind,

	/// Ordered, unique participants.
	pub participants: Vec<Participant>,

	/// Group name; `None` for direct chats.
	pub name: Option<String>,

	/// Updated whenever a new message lands in this chat.
	pub latest_message: Option<Message>,

	/// Group admin; `None` for direct chats.
	pub admin: Option<UserId>,
}

impl Chat {
	/// Display label: the group name, or for a direct chat the *other*
	/// participant's name.
	pub fn label(&self, viewer: &UserId) -> String {
		match self.kind {
			ChatKind::Group => self.name.clone().unwrap_or_else(|| "Unnamed group".to_string()),
			ChatKind::Direct => self
				.participants
				.iter()
				.find(|p| &p.id != viewer)
				.map(|p| p.display_name.clone())
				.unwrap_or_else(|| "Unknown".to_string()),
		}
	}

	/// The direct-chat peer, if any.
	pub fn direct_peer(&self, viewer: &UserId) -> Option<&Participant> {
		if self.kind != ChatKind::Direct {
			return None;
		}
		self.participants.iter().find(|p| &p.id != viewer)
	}
}

/// Delivery state of a message in the local log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
	/// Optimistically appended, awaiting the REST ack.
	Pending,
	/// Acknowledged by the server.
	Sent,
	/// REST create failed; content is preserved for resubmission.
	Failed,
}

/// Uploaded-attachment descriptor returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
	pub url: String,
	pub mime_type: String,
	pub file_name: String,
}

impl Attachment {
	pub fn is_image(&self) -> bool {
		self.mime_type.starts_with("image/")
	}

	pub fn is_video(&self) -> bool {
		self.mime_type.starts_with("video/")
	}
}

/// Denormalized reply snapshot, stored inline so a reply survives
/// deletion of the message it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
	pub sender_name: String,
	pub content: String,
}

impl ReplySnapshot {
	pub fn of(message: &Message) -> Self {
		Self {
			sender_name: message.sender.display_name.clone(),
			content: message.content.clone(),
		}
	}
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	/// Unique within its chat.
	pub id: MessageId,

	pub chat_id: ChatId,

	pub sender: Participant,

	pub content: String,

	pub attachment: Option<Attachment>,

	pub reply_to: Option<ReplySnapshot>,

	pub created_at: DateTime<Utc>,

	pub delivery: DeliveryState,
}

/// True when `messages[i]` starts a new sender run relative to the
/// previous message (used by renderers to decide avatar placement).
pub fn is_same_sender(messages: &[Message], i: usize) -> bool {
	i > 0 && messages[i - 1].sender.id == messages[i].sender.id
}

/// True when `messages[i]` is the last message of a peer's run, i.e. the
/// next message (if any) is from a different sender and this one is not
/// the viewer's own.
pub fn is_last_of_run(messages: &[Message], i: usize, viewer: &UserId) -> bool {
	if messages[i].sender.id == *viewer {
		return false;
	}
	match messages.get(i + 1) {
		Some(next) => next.sender.id != messages[i].sender.id,
		None => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn msg(id: &str, sender: &str) -> Message {
		Message {
			id: MessageId::new(id).unwrap(),
			chat_id: ChatId::new("c1").unwrap(),
			sender: Participant {
				id: UserId::new(sender).unwrap(),
				display_name: sender.to_uppercase(),
				avatar_url: None,
			},
			content: "hi".to_string(),
			attachment: None,
			reply_to: None,
			created_at: Utc::now(),
			delivery: DeliveryState::Sent,
		}
	}

	#[test]
	fn rejects_empty_ids() {
		assert!(UserId::new("").is_err());
		assert!(ChatId::new("   ").is_err());
		assert!("".parse::<MessageId>().is_err());
	}

	#[test]
	fn role_parse_and_display() {
		assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
		assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
		assert!("owner".parse::<Role>().is_err());
		assert_eq!(Role::Admin.to_string(), "admin");
	}

	#[test]
	fn secret_token_redacts() {
		let t = SecretToken::new("very-secret");
		assert_eq!(format!("{t:?}"), "SecretToken(<redacted>)");
		assert_eq!(t.to_string(), "<redacted>");
		assert_eq!(t.expose(), "very-secret");
	}

	#[test]
	fn direct_chat_label_names_the_other_participant() {
		let me = UserId::new("u1").unwrap();
		let chat = Chat {
			id: ChatId::new("c1").unwrap(),
			kind: ChatKind::Direct,
			participants: vec![
				Participant {
					id: UserId::new("u1").unwrap(),
					display_name: "Me".to_string(),
					avatar_url: None,
				},
				Participant {
					id: UserId::new("u2").unwrap(),
					display_name: "Ada".to_string(),
					avatar_url: None,
				},
			],
			name: None,
			latest_message: None,
			admin: None,
		};
		assert_eq!(chat.label(&me), "Ada");
		assert_eq!(chat.direct_peer(&me).unwrap().display_name, "Ada");
	}

	#[test]
	fn group_chat_label_uses_group_name() {
		let me = UserId::new("u1").unwrap();
		let chat = Chat {
			id: ChatId::new("g1").unwrap(),
			kind: ChatKind::Group,
			participants: Vec::new(),
			name: Some("Ops".to_string()),
			latest_message: None,
			admin: Some(UserId::new("u9").unwrap()),
		};
		assert_eq!(chat.label(&me), "Ops");
		assert!(chat.direct_peer(&me).is_none());
	}

	#[test]
	fn reply_snapshot_copies_sender_and_content() {
		let m = msg("m1", "ada");
		let snap = ReplySnapshot::of(&m);
		assert_eq!(snap.sender_name, "ADA");
		assert_eq!(snap.content, "hi");
	}

	#[test]
	fn sender_run_helpers() {
		let viewer = UserId::new("me").unwrap();
		let log = vec![msg("m1", "a"), msg("m2", "a"), msg("m3", "b")];

		assert!(!is_same_sender(&log, 0));
		assert!(is_same_sender(&log, 1));
		assert!(!is_same_sender(&log, 2));

		assert!(!is_last_of_run(&log, 0, &viewer));
		assert!(is_last_of_run(&log, 1, &viewer));
		assert!(is_last_of_run(&log, 2, &viewer));
	}
}

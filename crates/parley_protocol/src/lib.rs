#![forbid(unsafe_code)]

pub mod wire;

use parley_domain::{ChatId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::MessageDto;

/// Realtime event names.
///
/// The server does not suppress self-echo on `NEW_MESSAGE`; a sender is a
/// room member like any other and receives its own broadcast back as
/// `MESSAGE_RECEIVED`.
pub mod event {
	pub const SETUP: &str = "setup";
	pub const CONNECTED: &str = "connected";
	pub const JOIN_CHAT: &str = "join chat";
	pub const NEW_MESSAGE: &str = "new message";
	pub const MESSAGE_RECEIVED: &str = "message received";
	pub const TYPING: &str = "typing";
	pub const STOP_TYPING: &str = "stop typing";
}

/// Errors for envelope encode/decode.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("unknown event: {0}")]
	UnknownEvent(String),

	#[error("missing data for event: {0}")]
	MissingData(&'static str),
}

/// Identity payload published on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupDto {
	#[serde(rename = "_id")]
	pub user_id: UserId,

	pub name: String,
}

/// Typing presence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingDto {
	#[serde(rename = "chatId")]
	pub chat_id: ChatId,

	/// Present on consumed events; the server attributes published ones.
	#[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<UserId>,
}

/// Events this client publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
	/// Identity handshake, sent once per connection.
	Setup(SetupDto),

	JoinChat { chat_id: ChatId },

	/// Broadcast of a server-acknowledged message to the chat's room.
	NewMessage(Box<MessageDto>),

	Typing { chat_id: ChatId },

	StopTyping { chat_id: ChatId },
}

impl ClientEvent {
	pub fn name(&self) -> &'static str {
		match self {
			ClientEvent::Setup(_) => event::SETUP,
			ClientEvent::JoinChat { .. } => event::JOIN_CHAT,
			ClientEvent::NewMessage(_) => event::NEW_MESSAGE,
			ClientEvent::Typing { .. } => event::TYPING,
			ClientEvent::StopTyping { .. } => event::STOP_TYPING,
		}
	}
}

/// Events this client consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
	/// Handshake acknowledgement.
	Connected,

	MessageReceived(Box<MessageDto>),

	Typing { chat_id: ChatId, user_id: UserId },

	StopTyping { chat_id: ChatId, user_id: UserId },
}

#[derive(Debug, Serialize)]
struct OutEnvelope<'a, T: Serialize> {
	event: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InEnvelope {
	event: String,
	#[serde(default)]
	data: serde_json::Value,
}

/// Encode a client event as a JSON text frame.
pub fn encode_client_event(ev: &ClientEvent) -> Result<String, ProtocolError> {
	let text = match ev {
		ClientEvent::Setup(setup) => serde_json::to_string(&OutEnvelope {
			event: event::SETUP,
			data: Some(setup),
		})?,
		ClientEvent::JoinChat { chat_id } => serde_json::to_string(&OutEnvelope {
			event: event::JOIN_CHAT,
			data: Some(chat_id),
		})?,
		ClientEvent::NewMessage(msg) => serde_json::to_string(&OutEnvelope {
			event: event::NEW_MESSAGE,
			data: Some(msg),
		})?,
		ClientEvent::Typing { chat_id } => serde_json::to_string(&OutEnvelope {
			event: event::TYPING,
			data: Some(TypingDto {
				chat_id: chat_id.clone(),
				user_id: None,
			}),
		})?,
		ClientEvent::StopTyping { chat_id } => serde_json::to_string(&OutEnvelope {
			event: event::STOP_TYPING,
			data: Some(TypingDto {
				chat_id: chat_id.clone(),
				user_id: None,
			}),
		})?,
	};
	Ok(text)
}

/// Decode a JSON text frame into a server event.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
	let envelope: InEnvelope = serde_json::from_str(text)?;

	match envelope.event.as_str() {
		event::CONNECTED => Ok(ServerEvent::Connected),
		event::MESSAGE_RECEIVED => {
			let msg: MessageDto = serde_json::from_value(envelope.data)?;
			Ok(ServerEvent::MessageReceived(Box::new(msg)))
		}
		event::TYPING => {
			let t: TypingDto = serde_json::from_value(envelope.data)?;
			let user_id = t.user_id.ok_or(ProtocolError::MissingData("typing userId"))?;
			Ok(ServerEvent::Typing {
				chat_id: t.chat_id,
				user_id,
			})
		}
		event::STOP_TYPING => {
			let t: TypingDto = serde_json::from_value(envelope.data)?;
			let user_id = t.user_id.ok_or(ProtocolError::MissingData("stop typing userId"))?;
			Ok(ServerEvent::StopTyping {
				chat_id: t.chat_id,
				user_id,
			})
		}
		other => Err(ProtocolError::UnknownEvent(other.to_string())),
	}
}

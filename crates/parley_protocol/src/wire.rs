#![forbid(unsafe_code)]

//! JSON shapes shared by the REST API and the realtime channel.
//!
//! Field names follow the backend's casing (`_id`, `chatName`, ...); the
//! conversions below normalize into `parley_domain` types.

use chrono::{DateTime, Utc};
use parley_domain::{
	Attachment, Chat, ChatId, ChatKind, DeliveryState, Message, MessageId, Participant, ReplySnapshot, UserId,
};
use serde::{Deserialize, Serialize};

/// A user as embedded in chat and message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
	#[serde(rename = "_id")]
	pub id: UserId,

	pub name: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pic: Option<String>,
}

impl From<UserDto> for Participant {
	fn from(u: UserDto) -> Self {
		Participant {
			id: u.id,
			display_name: u.name,
			avatar_url: u.pic,
		}
	}
}

impl From<&Participant> for UserDto {
	fn from(p: &Participant) -> Self {
		UserDto {
			id: p.id.clone(),
			name: p.display_name.clone(),
			email: None,
			pic: p.avatar_url.clone(),
		}
	}
}

/// Reference to the chat a message belongs to.
///
/// The backend populates the full chat object on message payloads; only
/// the id is load-bearing here, the rest is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRefDto {
	#[serde(rename = "_id")]
	pub id: ChatId,
}

/// Denormalized reply preview carried inline on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDto {
	#[serde(rename = "senderName")]
	pub sender_name: String,

	pub content: String,
}

/// A message as sent over REST and the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDto {
	#[serde(rename = "_id")]
	pub id: MessageId,

	pub sender: UserDto,

	pub content: String,

	pub chat: ChatRefDto,

	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,

	#[serde(rename = "fileUrl", default, skip_serializing_if = "Option::is_none")]
	pub file_url: Option<String>,

	#[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
	pub file_type: Option<String>,

	#[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
	pub file_name: Option<String>,

	#[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
	pub reply_to: Option<ReplyDto>,
}

impl MessageDto {
	/// Normalize into a domain message. Server payloads are by definition
	/// acknowledged, so delivery is `Sent`.
	pub fn into_message(self) -> Message {
		let attachment = self.file_url.map(|url| Attachment {
			url,
			mime_type: self.file_type.unwrap_or_default(),
			file_name: self.file_name.unwrap_or_default(),
		});

		Message {
			id: self.id,
			chat_id: self.chat.id,
			sender: self.sender.into(),
			content: self.content,
			attachment,
			reply_to: self.reply_to.map(|r| ReplySnapshot {
				sender_name: r.sender_name,
				content: r.content,
			}),
			created_at: self.created_at,
			delivery: DeliveryState::Sent,
		}
	}
}

impl From<&Message> for MessageDto {
	fn from(m: &Message) -> Self {
		MessageDto {
			id: m.id.clone(),
			sender: (&m.sender).into(),
			content: m.content.clone(),
			chat: ChatRefDto {
				id: m.chat_id.clone(),
			},
			created_at: m.created_at,
			file_url: m.attachment.as_ref().map(|a| a.url.clone()),
			file_type: m.attachment.as_ref().map(|a| a.mime_type.clone()),
			file_name: m.attachment.as_ref().map(|a| a.file_name.clone()),
			reply_to: m.reply_to.as_ref().map(|r| ReplyDto {
				sender_name: r.sender_name.clone(),
				content: r.content.clone(),
			}),
		}
	}
}

/// A chat as listed by `GET /chats` and `GET /admin/chats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDto {
	#[serde(rename = "_id")]
	pub id: ChatId,

	#[serde(rename = "chatName", default, skip_serializing_if = "Option::is_none")]
	pub chat_name: Option<String>,

	#[serde(rename = "isGroupChat", default)]
	pub is_group_chat: bool,

	#[serde(default)]
	pub users: Vec<UserDto>,

	#[serde(rename = "latestMessage", default, skip_serializing_if = "Option::is_none")]
	pub latest_message: Option<Box<MessageDto>>,

	#[serde(rename = "groupAdmin", default, skip_serializing_if = "Option::is_none")]
	pub group_admin: Option<UserDto>,
}

impl ChatDto {
	/// Normalize into a domain chat, deduplicating participants by id
	/// while preserving order.
	pub fn into_chat(self) -> Chat {
		let mut participants: Vec<Participant> = Vec::with_capacity(self.users.len());
		for user in self.users {
			let p: Participant = user.into();
			if !participants.iter().any(|existing| existing.id == p.id) {
				participants.push(p);
			}
		}

		let kind = if self.is_group_chat { ChatKind::Group } else { ChatKind::Direct };

		Chat {
			id: self.id,
			kind,
			participants,
			name: if self.is_group_chat { self.chat_name } else { None },
			latest_message: self.latest_message.map(|m| m.into_message()),
			admin: self.group_admin.map(|u| u.id),
		}
	}
}

/// Response of `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponseDto {
	#[serde(rename = "fileUrl")]
	pub file_url: String,

	#[serde(rename = "fileType")]
	pub file_type: String,

	#[serde(rename = "fileName")]
	pub file_name: String,
}

impl From<UploadResponseDto> for Attachment {
	fn from(r: UploadResponseDto) -> Self {
		Attachment {
			url: r.file_url,
			mime_type: r.file_type,
			file_name: r.file_name,
		}
	}
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessageRequest {
	pub content: String,

	#[serde(rename = "chatId")]
	pub chat_id: ChatId,

	#[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
	pub reply_to: Option<ReplyDto>,

	#[serde(rename = "fileUrl", default, skip_serializing_if = "Option::is_none")]
	pub file_url: Option<String>,

	#[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
	pub file_type: Option<String>,

	#[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
	pub file_name: Option<String>,
}

/// Body of `POST /chat/group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGroupChatRequest {
	pub name: String,

	pub users: Vec<UserId>,
}

/// Body of `DELETE /messages/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageRequest {
	#[serde(rename = "deleteForEveryone")]
	pub delete_for_everyone: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn message_dto_decodes_backend_shape() {
		let raw = r#"{
			"_id": "m1",
			"sender": { "_id": "u2", "name": "Ada", "email": "ada@example.com", "pic": "http://x/p.png" },
			"content": "see attached",
			"chat": { "_id": "c1", "chatName": "Ops", "isGroupChat": true },
			"createdAt": "2026-02-01T12:00:00Z",
			"fileUrl": "http://x/f.pdf",
			"fileType": "application/pdf",
			"fileName": "f.pdf",
			"replyTo": { "senderName": "Bob", "content": "original" }
		}"#;

		let dto: MessageDto = serde_json::from_str(raw).unwrap();
		let msg = dto.into_message();

		assert_eq!(msg.id.as_str(), "m1");
		assert_eq!(msg.chat_id.as_str(), "c1");
		assert_eq!(msg.sender.display_name, "Ada");
		assert_eq!(msg.delivery, DeliveryState::Sent);

		let att = msg.attachment.unwrap();
		assert_eq!(att.url, "http://x/f.pdf");
		assert_eq!(att.mime_type, "application/pdf");
		assert_eq!(att.file_name, "f.pdf");

		let reply = msg.reply_to.unwrap();
		assert_eq!(reply.sender_name, "Bob");
		assert_eq!(reply.content, "original");
	}

	#[test]
	fn chat_dto_direct_chat_has_no_name() {
		let raw = r#"{
			"_id": "c1",
			"chatName": "sender",
			"isGroupChat": false,
			"users": [
				{ "_id": "u1", "name": "Me" },
				{ "_id": "u2", "name": "Ada" },
				{ "_id": "u2", "name": "Ada" }
			]
		}"#;

		let chat: Chat = serde_json::from_str::<ChatDto>(raw).unwrap().into_chat();
		assert_eq!(chat.kind, ChatKind::Direct);
		assert_eq!(chat.name, None);
		assert_eq!(chat.participants.len(), 2, "duplicate users collapse");
	}

	#[test]
	fn new_message_request_serializes_backend_field_names() {
		let req = NewMessageRequest {
			content: "hello".to_string(),
			chat_id: ChatId::new("c1").unwrap(),
			reply_to: None,
			file_url: None,
			file_type: None,
			file_name: None,
		};
		let v = serde_json::to_value(&req).unwrap();
		assert_eq!(v, serde_json::json!({ "content": "hello", "chatId": "c1" }));
	}

	#[test]
	fn message_roundtrip_through_dto() {
		let raw = r#"{
			"_id": "m7",
			"sender": { "_id": "u1", "name": "Me" },
			"content": "ping",
			"chat": { "_id": "c9" },
			"createdAt": "2026-02-01T09:30:00Z"
		}"#;

		let msg = serde_json::from_str::<MessageDto>(raw).unwrap().into_message();
		let dto = MessageDto::from(&msg);
		assert_eq!(dto.id, msg.id);
		assert_eq!(dto.chat.id, msg.chat_id);
		assert_eq!(dto.content, "ping");
		assert!(dto.file_url.is_none());
	}
}

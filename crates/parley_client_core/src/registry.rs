#![forbid(unsafe_code)]

use parley_domain::{Chat, ChatId, Message};

/// The fetched list of chats visible to the session, plus the single
/// active-chat pointer.
#[derive(Debug, Default)]
pub struct ChatRegistry {
	chats: Vec<Chat>,
	active: Option<ChatId>,
}

impl ChatRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the chat list wholesale (REST seed / refresh). An active
	/// pointer to a chat that disappeared is cleared.
	pub fn set_chats(&mut self, chats: Vec<Chat>) {
		self.chats = chats;
		if let Some(active) = &self.active
			&& !self.chats.iter().any(|c| &c.id == active)
		{
			self.active = None;
		}
	}

	/// Insert or replace a single chat (access-or-create result).
	pub fn upsert(&mut self, chat: Chat) {
		match self.chats.iter_mut().find(|c| c.id == chat.id) {
			Some(existing) => *existing = chat,
			None => self.chats.push(chat),
		}
	}

	pub fn get(&self, chat: &ChatId) -> Option<&Chat> {
		self.chats.iter().find(|c| &c.id == chat)
	}

	pub fn active(&self) -> Option<&ChatId> {
		self.active.as_ref()
	}

	pub fn set_active(&mut self, chat: Option<ChatId>) {
		self.active = chat;
	}

	/// Chats ordered by recency of their latest message, newest first;
	/// chats without messages sink to the end. Ties break by id so the
	/// ordering is deterministic.
	pub fn list(&self) -> Vec<&Chat> {
		let mut out: Vec<&Chat> = self.chats.iter().collect();
		out.sort_by(|a, b| {
			let a_at = a.latest_message.as_ref().map(|m| m.created_at);
			let b_at = b.latest_message.as_ref().map(|m| m.created_at);
			b_at.cmp(&a_at).then_with(|| a.id.cmp(&b.id))
		});
		out
	}

	/// Update `latest_message` for the chat a new message landed in.
	pub fn record_latest(&mut self, message: &Message) {
		if let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat_id) {
			let newer = chat
				.latest_message
				.as_ref()
				.is_none_or(|latest| message.created_at >= latest.created_at);
			if newer {
				chat.latest_message = Some(message.clone());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use parley_domain::{ChatKind, DeliveryState, MessageId, Participant, UserId};

	fn chat(id: &str) -> Chat {
		Chat {
			id: ChatId::new(id).unwrap(),
			kind: ChatKind::Direct,
			participants: Vec::new(),
			name: None,
			latest_message: None,
			admin: None,
		}
	}

	fn msg(id: &str, chat: &str, minute: u32) -> Message {
		Message {
			id: MessageId::new(id).unwrap(),
			chat_id: ChatId::new(chat).unwrap(),
			sender: Participant {
				id: UserId::new("u1").unwrap(),
				display_name: "Ada".to_string(),
				avatar_url: None,
			},
			content: "x".to_string(),
			attachment: None,
			reply_to: None,
			created_at: Utc.with_ymd_and_hms(2026, 2, 1, 12, minute, 0).unwrap(),
			delivery: DeliveryState::Sent,
		}
	}

	#[test]
	fn list_orders_by_latest_recency_then_id() {
		let mut reg = ChatRegistry::new();
		reg.set_chats(vec![chat("b"), chat("a"), chat("c")]);
		reg.record_latest(&msg("m1", "c", 5));
		reg.record_latest(&msg("m2", "a", 9));

		let ids: Vec<&str> = reg.list().iter().map(|c| c.id.as_str()).collect();
		// "a" newest, then "c"; "b" has no messages and sorts by id last.
		assert_eq!(ids, vec!["a", "c", "b"]);
	}

	#[test]
	fn tie_on_recency_breaks_by_id() {
		let mut reg = ChatRegistry::new();
		reg.set_chats(vec![chat("z"), chat("y")]);
		reg.record_latest(&msg("m1", "z", 5));
		reg.record_latest(&msg("m2", "y", 5));

		let ids: Vec<&str> = reg.list().iter().map(|c| c.id.as_str()).collect();
		assert_eq!(ids, vec!["y", "z"]);
	}

	#[test]
	fn record_latest_ignores_older_messages() {
		let mut reg = ChatRegistry::new();
		reg.set_chats(vec![chat("a")]);
		reg.record_latest(&msg("m2", "a", 9));
		reg.record_latest(&msg("m1", "a", 5));

		let latest = reg.get(&ChatId::new("a").unwrap()).unwrap().latest_message.as_ref();
		assert_eq!(latest.unwrap().id.as_str(), "m2");
	}

	#[test]
	fn set_chats_clears_a_dangling_active_pointer() {
		let mut reg = ChatRegistry::new();
		reg.set_chats(vec![chat("a")]);
		reg.set_active(Some(ChatId::new("a").unwrap()));

		reg.set_chats(vec![chat("b")]);
		assert!(reg.active().is_none());
	}

	#[test]
	fn upsert_replaces_by_id() {
		let mut reg = ChatRegistry::new();
		reg.set_chats(vec![chat("a")]);

		let mut updated = chat("a");
		updated.name = Some("renamed".to_string());
		reg.upsert(updated);
		reg.upsert(chat("b"));

		assert_eq!(reg.list().len(), 2);
		assert_eq!(
			reg.get(&ChatId::new("a").unwrap()).unwrap().name.as_deref(),
			Some("renamed")
		);
	}
}

#![forbid(unsafe_code)]

use parley_domain::{ChatId, Message};

/// An unseen message for a chat other than the active one.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
	pub message: Message,

	/// Label of the chat at the time the message arrived.
	pub chat_label: String,
}

/// Queue of unseen messages, most recent first. Never holds an entry for
/// the currently active chat; `Engine::select_chat` clears a chat's
/// entries the moment it becomes active.
#[derive(Debug, Default)]
pub struct NotificationAggregator {
	entries: Vec<NotificationEntry>,
}

impl NotificationAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Prepend a message unless an entry with the same id already exists.
	/// Returns true when the entry was added.
	pub fn push(&mut self, message: Message, chat_label: String) -> bool {
		if self.entries.iter().any(|e| e.message.id == message.id) {
			return false;
		}
		self.entries.insert(0, NotificationEntry { message, chat_label });
		true
	}

	/// Remove every entry for `chat`.
	pub fn clear(&mut self, chat: &ChatId) {
		self.entries.retain(|e| &e.message.chat_id != chat);
	}

	/// Empty the queue (explicit user action).
	pub fn clear_all(&mut self) {
		self.entries.clear();
	}

	/// Badge count.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[NotificationEntry] {
		&self.entries
	}
}

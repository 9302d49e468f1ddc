#![forbid(unsafe_code)]

use std::collections::HashMap;

use parley_domain::{ChatId, DeliveryState, Message, MessageId};
use tracing::debug;

/// Per-chat ordered message log.
///
/// Merges REST-fetched history with realtime deltas. All mutation goes
/// through these methods; the fetch bookkeeping below is what makes the
/// selection races in `Engine` safe:
///
/// - a realtime delta for a chat whose fetch is still in flight is
///   buffered and merged by id-union once the fetch resolves;
/// - a fetch response is discarded when its ticket no longer matches the
///   current fetch generation or the active chat.
#[derive(Debug, Default)]
pub struct MessageStore {
	logs: HashMap<ChatId, Vec<Message>>,
	fetch: Option<FetchState>,
	next_generation: u64,
}

/// Captured target of an in-flight history fetch. Checked at resolution
/// time, not against whatever is active when the response lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
	pub chat: ChatId,
	pub generation: u64,
}

#[derive(Debug)]
struct FetchState {
	chat: ChatId,
	generation: u64,
	buffered: Vec<Message>,
}

/// Result of completing a history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
	/// The log was replaced (fetched ∪ buffered, optimistic re-appended).
	Applied,
	/// Superseded or target mismatch; response dropped silently.
	Stale,
}

impl MessageStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn log(&self, chat: &ChatId) -> &[Message] {
		self.logs.get(chat).map(Vec::as_slice).unwrap_or_default()
	}

	pub fn contains(&self, chat: &ChatId, message: &MessageId) -> bool {
		self.log(chat).iter().any(|m| &m.id == message)
	}

	/// Start a history fetch for `chat`. A newer fetch supersedes any
	/// in-flight one: the older ticket will resolve as stale.
	pub fn begin_fetch(&mut self, chat: ChatId) -> FetchTicket {
		self.next_generation += 1;
		let ticket = FetchTicket {
			chat: chat.clone(),
			generation: self.next_generation,
		};
		self.fetch = Some(FetchState {
			chat,
			generation: self.next_generation,
			buffered: Vec::new(),
		});
		ticket
	}

	/// Append a server-confirmed realtime message. Idempotent by id.
	/// Returns true when the message was newly recorded (directly or into
	/// the fetch buffer).
	pub fn append_live(&mut self, message: Message) -> bool {
		if let Some(fetch) = self.fetch.as_mut()
			&& fetch.chat == message.chat_id
		{
			if fetch.buffered.iter().any(|m| m.id == message.id) {
				return false;
			}
			fetch.buffered.push(message);
			return true;
		}

		let log = self.logs.entry(message.chat_id.clone()).or_default();
		if log.iter().any(|m| m.id == message.id) {
			return false;
		}
		log.push(message);
		true
	}

	/// Append an optimistic local message (delivery `Pending`).
	pub fn append_local(&mut self, message: Message) {
		self.logs.entry(message.chat_id.clone()).or_default().push(message);
	}

	/// Resolve a pending message with its server-acknowledged form. The
	/// local id is superseded by the server-assigned one; if the echo
	/// already landed under the server id, the local entry is dropped
	/// instead of duplicated.
	pub fn resolve_pending(&mut self, chat: &ChatId, local_id: &MessageId, acked: Message) {
		if let Some(fetch) = self.fetch.as_mut()
			&& fetch.chat == *chat
			&& !fetch.buffered.iter().any(|m| m.id == acked.id)
		{
			// A fetch snapshot taken before the ack may miss this message;
			// buffering the ack keeps it in the merged log.
			fetch.buffered.push(acked.clone());
		}

		let Some(log) = self.logs.get_mut(chat) else {
			return;
		};

		if log.iter().any(|m| m.id == acked.id) {
			log.retain(|m| &m.id != local_id);
			return;
		}

		match log.iter_mut().find(|m| &m.id == local_id) {
			Some(entry) => *entry = acked,
			None => log.push(acked),
		}
	}

	pub fn mark_failed(&mut self, chat: &ChatId, local_id: &MessageId) {
		if let Some(entry) = self
			.logs
			.get_mut(chat)
			.and_then(|log| log.iter_mut().find(|m| &m.id == local_id))
		{
			entry.delivery = DeliveryState::Failed;
		}
	}

	pub fn mark_pending(&mut self, chat: &ChatId, local_id: &MessageId) {
		if let Some(entry) = self
			.logs
			.get_mut(chat)
			.and_then(|log| log.iter_mut().find(|m| &m.id == local_id))
		{
			entry.delivery = DeliveryState::Pending;
		}
	}

	/// Remove one message (local effect of a delete call).
	pub fn remove(&mut self, chat: &ChatId, message: &MessageId) -> bool {
		let Some(log) = self.logs.get_mut(chat) else {
			return false;
		};
		let before = log.len();
		log.retain(|m| &m.id != message);
		log.len() != before
	}

	/// Complete a history fetch. The response replaces the log wholesale,
	/// then buffered realtime deltas are merged by id-union and the whole
	/// log re-sorted by `created_at`; optimistic messages absent from the
	/// fetched set are re-appended, matched by id.
	pub fn complete_fetch(&mut self, ticket: &FetchTicket, fetched: Vec<Message>, active: Option<&ChatId>) -> FetchOutcome {
		let current = self.fetch.as_ref().map(|f| f.generation);
		if current != Some(ticket.generation) {
			debug!(chat = %ticket.chat, generation = ticket.generation, "dropping superseded history fetch");
			return FetchOutcome::Stale;
		}

		let state = self.fetch.take().expect("fetch state checked above");

		if active != Some(&ticket.chat) {
			debug!(chat = %ticket.chat, "dropping history fetch for a no-longer-active chat");
			return FetchOutcome::Stale;
		}

		let old = self.logs.remove(&ticket.chat).unwrap_or_default();

		let mut merged: Vec<Message> = Vec::with_capacity(fetched.len() + state.buffered.len());
		for message in fetched.into_iter().chain(state.buffered) {
			if !merged.iter().any(|m| m.id == message.id) {
				merged.push(message);
			}
		}
		merged.sort_by_key(|m| m.created_at);

		for message in old {
			if message.delivery != DeliveryState::Sent && !merged.iter().any(|m| m.id == message.id) {
				merged.push(message);
			}
		}

		self.logs.insert(ticket.chat.clone(), merged);
		FetchOutcome::Applied
	}

	/// Abandon a failed fetch. Buffered deltas are not lost: they are
	/// appended to whatever log was already in memory.
	pub fn abandon_fetch(&mut self, ticket: &FetchTicket) {
		let current = self.fetch.as_ref().map(|f| f.generation);
		if current != Some(ticket.generation) {
			return;
		}

		let state = self.fetch.take().expect("fetch state checked above");
		for message in state.buffered {
			let log = self.logs.entry(message.chat_id.clone()).or_default();
			if !log.iter().any(|m| m.id == message.id) {
				log.push(message);
			}
		}
	}
}

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parley_domain::{ChatId, UserId};

/// Idle threshold after the last keystroke before "stop typing" fires.
pub const TYPING_IDLE: Duration = Duration::from_millis(3000);

/// Remote typing entries expire after this long without a refresh, so a
/// peer that disconnects mid-typing cannot leave a stale indicator.
pub const REMOTE_TYPING_TTL: Duration = Duration::from_secs(30);

/// Per-chat typing presence: the local debounce state machine plus the
/// remote peer sets.
///
/// The coordinator is a pure state machine over injected instants; the
/// runtime owns the actual timer. One timer per chat, replaced (never
/// stacked) on each keystroke.
#[derive(Debug, Default)]
pub struct TypingCoordinator {
	local: HashMap<ChatId, LocalTyping>,
	remote: HashMap<ChatId, HashMap<UserId, Instant>>,
}

#[derive(Debug)]
struct LocalTyping {
	last_keystroke: Instant,
}

impl TypingCoordinator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a content-changing input event. Returns true when a
	/// "typing" start should be emitted, i.e. this chat was not already
	/// flagged as locally typing.
	pub fn keystroke(&mut self, chat: &ChatId, now: Instant) -> bool {
		match self.local.get_mut(chat) {
			Some(state) => {
				state.last_keystroke = now;
				false
			}
			None => {
				self.local.insert(chat.clone(), LocalTyping { last_keystroke: now });
				true
			}
		}
	}

	/// The debounce timer for `chat` fired. Returns true when "stop
	/// typing" should be emitted: no keystroke has occurred within the
	/// idle threshold. A late-firing stale timer is a no-op because each
	/// keystroke pushed `last_keystroke` forward.
	pub fn debounce_fired(&mut self, chat: &ChatId, now: Instant) -> bool {
		let Some(state) = self.local.get(chat) else {
			return false;
		};

		if now.saturating_duration_since(state.last_keystroke) >= TYPING_IDLE {
			self.local.remove(chat);
			return true;
		}
		false
	}

	/// Clear local typing state without waiting for the debounce (chat
	/// deselect, message send). Returns true when the chat was flagged,
	/// in which case the caller owes the room one "stop typing".
	pub fn cancel_local(&mut self, chat: &ChatId) -> bool {
		self.local.remove(chat).is_some()
	}

	pub fn is_local_typing(&self, chat: &ChatId) -> bool {
		self.local.contains_key(chat)
	}

	/// A peer started (or refreshed) typing.
	pub fn remote_typing(&mut self, chat: &ChatId, peer: UserId, now: Instant) {
		self.remote.entry(chat.clone()).or_default().insert(peer, now);
	}

	/// A peer stopped typing.
	pub fn remote_stop(&mut self, chat: &ChatId, peer: &UserId) {
		if let Some(peers) = self.remote.get_mut(chat) {
			peers.remove(peer);
			if peers.is_empty() {
				self.remote.remove(chat);
			}
		}
	}

	/// Peers currently typing in `chat`, expired entries excluded.
	/// Only the active chat's set is surfaced by the engine.
	pub fn typists(&self, chat: &ChatId, now: Instant) -> Vec<UserId> {
		let Some(peers) = self.remote.get(chat) else {
			return Vec::new();
		};
		let mut out: Vec<UserId> = peers
			.iter()
			.filter(|(_, seen)| now.saturating_duration_since(**seen) < REMOTE_TYPING_TTL)
			.map(|(peer, _)| peer.clone())
			.collect();
		out.sort();
		out
	}

	/// Drop expired remote entries.
	pub fn sweep(&mut self, now: Instant) {
		for peers in self.remote.values_mut() {
			peers.retain(|_, seen| now.saturating_duration_since(*seen) < REMOTE_TYPING_TTL);
		}
		self.remote.retain(|_, peers| !peers.is_empty());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cid(s: &str) -> ChatId {
		ChatId::new(s).unwrap()
	}

	fn uid(s: &str) -> UserId {
		UserId::new(s).unwrap()
	}

	#[test]
	fn burst_emits_one_start_then_one_stop() {
		let mut typing = TypingCoordinator::new();
		let chat = cid("c1");
		let t0 = Instant::now();

		assert!(typing.keystroke(&chat, t0));
		assert!(!typing.keystroke(&chat, t0 + Duration::from_millis(500)));
		assert!(!typing.keystroke(&chat, t0 + Duration::from_millis(1_000)));

		// Timer from the first keystroke fires but a newer keystroke
		// happened since: no stop yet.
		assert!(!typing.debounce_fired(&chat, t0 + Duration::from_millis(3_000)));
		assert!(typing.is_local_typing(&chat));

		// Timer from the last keystroke fires after a full idle window.
		assert!(typing.debounce_fired(&chat, t0 + Duration::from_millis(4_000)));
		assert!(!typing.is_local_typing(&chat));

		// A keystroke after the stop starts a fresh burst.
		assert!(typing.keystroke(&chat, t0 + Duration::from_millis(5_000)));
	}

	#[test]
	fn debounce_without_local_state_is_a_noop() {
		let mut typing = TypingCoordinator::new();
		assert!(!typing.debounce_fired(&cid("c1"), Instant::now()));
	}

	#[test]
	fn cancel_reports_whether_a_stop_is_owed() {
		let mut typing = TypingCoordinator::new();
		let chat = cid("c1");
		assert!(!typing.cancel_local(&chat));

		typing.keystroke(&chat, Instant::now());
		assert!(typing.cancel_local(&chat));
		assert!(!typing.is_local_typing(&chat));
	}

	#[test]
	fn local_state_is_per_chat() {
		let mut typing = TypingCoordinator::new();
		let t0 = Instant::now();
		assert!(typing.keystroke(&cid("a"), t0));
		assert!(typing.keystroke(&cid("b"), t0));

		assert!(typing.debounce_fired(&cid("a"), t0 + TYPING_IDLE));
		assert!(typing.is_local_typing(&cid("b")));
	}

	#[test]
	fn remote_peers_track_start_and_stop() {
		let mut typing = TypingCoordinator::new();
		let chat = cid("c1");
		let t0 = Instant::now();

		typing.remote_typing(&chat, uid("u2"), t0);
		typing.remote_typing(&chat, uid("u3"), t0);
		assert_eq!(typing.typists(&chat, t0).len(), 2);

		typing.remote_stop(&chat, &uid("u2"));
		assert_eq!(typing.typists(&chat, t0), vec![uid("u3")]);
	}

	#[test]
	fn remote_entries_expire_without_a_stop() {
		let mut typing = TypingCoordinator::new();
		let chat = cid("c1");
		let t0 = Instant::now();

		typing.remote_typing(&chat, uid("u2"), t0);
		assert_eq!(typing.typists(&chat, t0 + REMOTE_TYPING_TTL).len(), 0);

		typing.sweep(t0 + REMOTE_TYPING_TTL);
		assert!(typing.remote.is_empty());
	}
}

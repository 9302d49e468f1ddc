#![forbid(unsafe_code)]

//! Read-only admin monitoring console.
//!
//! Reuses `ChatRegistry` and `MessageStore` with the elevated listing
//! endpoints. Selection works exactly like the end-user client, but the
//! monitor never exposes a composer or typing emission; it publishes
//! nothing except room joins. The realtime subscription stays live while
//! monitoring, so an open conversation updates without re-polling — the
//! same delivery path the end-user client uses.

use std::sync::Arc;

use parley_domain::{Chat, ChatId, Message, Participant, UserId};
use parley_protocol::ServerEvent;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::ClientError;
use crate::registry::ChatRegistry;
use crate::services::SharedApi;
use crate::session::SessionContext;
use crate::store::MessageStore;
use parley_net::{SocketHandle, SocketSubscription};

#[derive(Default)]
struct MonitorState {
	registry: ChatRegistry,
	store: MessageStore,
	users: Vec<Participant>,
}

impl MonitorState {
	/// Apply one realtime event. Messages for the monitored chat land in
	/// its log; everything else only refreshes chat recency. Typing
	/// events are ignored: the monitor surfaces no presence.
	fn apply_event(&mut self, event: ServerEvent) {
		if let ServerEvent::MessageReceived(dto) = event {
			let message = dto.into_message();
			self.registry.record_latest(&message);
			if self.registry.active() == Some(&message.chat_id) {
				self.store.append_live(message);
			}
		}
	}
}

struct MonitorInner {
	api: SharedApi,
	socket: SocketHandle,
	state: parking_lot::Mutex<MonitorState>,
}

/// Read-only monitoring console for admin sessions.
pub struct AdminMonitor {
	inner: Arc<MonitorInner>,
	session: SessionContext,
	_subscription: SocketSubscription,
	pump: tokio::task::JoinHandle<()>,
}

impl Drop for AdminMonitor {
	fn drop(&mut self) {
		self.pump.abort();
	}
}

impl AdminMonitor {
	/// Start monitoring. Requires an admin session; the initial listing
	/// is fetched before this returns.
	pub async fn start(api: SharedApi, socket: SocketHandle, session: SessionContext) -> Result<Self, ClientError> {
		if !session.is_admin() {
			return Err(ClientError::AdminRequired);
		}

		let (subscription, events) = socket.subscribe();
		let inner = Arc::new(MonitorInner {
			api,
			socket,
			state: parking_lot::Mutex::new(MonitorState::default()),
		});

		let pump = spawn_event_pump(Arc::clone(&inner), events);

		let monitor = Self {
			inner,
			session,
			_subscription: subscription,
			pump,
		};
		monitor.refresh().await?;
		Ok(monitor)
	}

	pub fn session(&self) -> &SessionContext {
		&self.session
	}

	/// Re-fetch the elevated user and chat listings.
	pub async fn refresh(&self) -> Result<(), ClientError> {
		let users = self.inner.api.admin_users().await?;
		let chats = self.inner.api.admin_chats().await?;

		let mut state = self.inner.state.lock();
		state.users = users;
		state.registry.set_chats(chats);
		Ok(())
	}

	pub fn users(&self) -> Vec<Participant> {
		self.inner.state.lock().users.clone()
	}

	/// All chats, ordered by recency.
	pub fn chats(&self) -> Vec<Chat> {
		self.inner.state.lock().registry.list().into_iter().cloned().collect()
	}

	/// The subset of chats a given user participates in.
	pub fn chats_for_user(&self, user: &UserId) -> Vec<Chat> {
		self.inner
			.state
			.lock()
			.registry
			.list()
			.into_iter()
			.filter(|c| c.participants.iter().any(|p| &p.id == user))
			.cloned()
			.collect()
	}

	pub fn active_chat(&self) -> Option<ChatId> {
		self.inner.state.lock().registry.active().cloned()
	}

	pub fn log(&self, chat: &ChatId) -> Vec<Message> {
		self.inner.state.lock().store.log(chat).to_vec()
	}

	/// Select a conversation for viewing. Same room/fetch discipline as
	/// the end-user client: leave the previous room, join the new one,
	/// fetch history with the captured target checked at resolution.
	pub async fn select_chat(&self, target: Option<ChatId>) -> Result<(), ClientError> {
		let (previous, ticket) = {
			let mut state = self.inner.state.lock();
			let previous = state.registry.active().cloned();
			state.registry.set_active(target.clone());
			let ticket = target.clone().map(|chat| state.store.begin_fetch(chat));
			(previous, ticket)
		};

		if let Some(previous) = previous {
			self.inner.socket.leave_room(previous);
		}
		if let Some(chat) = target {
			self.inner.socket.join_room(chat);
		}

		let Some(ticket) = ticket else {
			return Ok(());
		};

		match self.inner.api.fetch_messages(&ticket.chat).await {
			Ok(messages) => {
				let mut state = self.inner.state.lock();
				let active = state.registry.active().cloned();
				state.store.complete_fetch(&ticket, messages, active.as_ref());
				Ok(())
			}
			Err(err) => {
				self.inner.state.lock().store.abandon_fetch(&ticket);
				Err(err.into())
			}
		}
	}

	/// Terminate a user account, then refresh the listings.
	pub async fn terminate_user(&self, user: &UserId) -> Result<(), ClientError> {
		self.inner.api.terminate_user(user).await?;
		self.refresh().await
	}
}

fn spawn_event_pump(
	inner: Arc<MonitorInner>,
	mut events: mpsc::UnboundedReceiver<ServerEvent>,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(event) = events.recv().await {
			inner.state.lock().apply_event(event);
		}
		info!("admin monitor event stream ended");
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use parley_domain::{ChatKind, DeliveryState, MessageId};
	use parley_protocol::wire::MessageDto;

	fn cid(s: &str) -> ChatId {
		ChatId::new(s).unwrap()
	}

	fn participant(id: &str) -> Participant {
		Participant {
			id: UserId::new(id).unwrap(),
			display_name: id.to_uppercase(),
			avatar_url: None,
		}
	}

	fn chat(id: &str, users: &[&str]) -> Chat {
		Chat {
			id: cid(id),
			kind: ChatKind::Direct,
			participants: users.iter().map(|u| participant(u)).collect(),
			name: None,
			latest_message: None,
			admin: None,
		}
	}

	fn msg(id: &str, chat: &str) -> Message {
		Message {
			id: MessageId::new(id).unwrap(),
			chat_id: cid(chat),
			sender: participant("u2"),
			content: "hi".to_string(),
			attachment: None,
			reply_to: None,
			created_at: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
			delivery: DeliveryState::Sent,
		}
	}

	#[test]
	fn events_for_the_monitored_chat_land_in_its_log() {
		let mut state = MonitorState::default();
		state.registry.set_chats(vec![chat("c1", &["a", "b"]), chat("c2", &["a", "c"])]);
		state.registry.set_active(Some(cid("c1")));

		state.apply_event(ServerEvent::MessageReceived(Box::new(MessageDto::from(&msg("m1", "c1")))));
		state.apply_event(ServerEvent::MessageReceived(Box::new(MessageDto::from(&msg("m2", "c2")))));

		assert_eq!(state.store.log(&cid("c1")).len(), 1);
		assert!(state.store.log(&cid("c2")).is_empty(), "non-active chats are not logged");

		// Recency still updates for every chat.
		assert!(state.registry.get(&cid("c2")).unwrap().latest_message.is_some());
	}

	#[test]
	fn typing_events_are_ignored() {
		let mut state = MonitorState::default();
		state.registry.set_chats(vec![chat("c1", &["a", "b"])]);
		state.registry.set_active(Some(cid("c1")));

		state.apply_event(ServerEvent::Typing {
			chat_id: cid("c1"),
			user_id: UserId::new("a").unwrap(),
		});
		// Nothing to observe: the monitor has no typing surface at all.
		assert!(state.store.log(&cid("c1")).is_empty());
	}

	#[test]
	fn duplicate_deliveries_dedupe_in_the_monitor_too() {
		let mut state = MonitorState::default();
		state.registry.set_chats(vec![chat("c1", &["a", "b"])]);
		state.registry.set_active(Some(cid("c1")));

		let m = msg("m1", "c1");
		state.apply_event(ServerEvent::MessageReceived(Box::new(MessageDto::from(&m))));
		state.apply_event(ServerEvent::MessageReceived(Box::new(MessageDto::from(&m))));
		assert_eq!(state.store.log(&cid("c1")).len(), 1);
	}
}

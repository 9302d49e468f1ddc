#![forbid(unsafe_code)]

//! The synchronization engine.
//!
//! A synchronous state machine over the session's components. Every input
//! (user action, realtime event, resolved REST call) returns the side
//! effects to perform as [`Action`] values; the async runtime in
//! `client.rs` executes them and feeds results back in. Socket callbacks,
//! debounce timers and response callbacks therefore interleave on one
//! logical queue with no ordering assumptions between them.

use chrono::Utc;
use parley_domain::{Attachment, Chat, ChatId, Message, MessageId, ReplySnapshot};
use parley_net::{ApiError, FileSource};
use parley_protocol::wire::{MessageDto, NewGroupChatRequest, NewMessageRequest, ReplyDto};
use parley_protocol::{ClientEvent, ServerEvent};
use tracing::{debug, warn};

use crate::composer::{Composer, SendPhase};
use crate::error::ClientError;
use crate::notifications::{NotificationAggregator, NotificationEntry};
use crate::registry::ChatRegistry;
use crate::services::SharedClock;
use crate::session::SessionContext;
use crate::store::{FetchTicket, MessageStore};
use crate::typing::TypingCoordinator;
use crate::upload::{AttachmentUploader, PreviewKind, UploadTask};

use std::collections::HashMap;

/// Captured target of an in-flight `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTicket {
	pub chat: ChatId,
	pub local_id: MessageId,
}

/// Side effects requested by the engine, executed by the runtime.
#[derive(Debug)]
pub enum Action {
	/// Run `GET /messages/{chatId}` and resolve via
	/// [`Engine::history_fetched`].
	FetchHistory(FetchTicket),

	JoinRoom(ChatId),

	LeaveRoom(ChatId),

	Publish(ClientEvent),

	/// (Re)arm the single debounce timer for this chat, replacing any
	/// pending one. Fires back into [`Engine::debounce_fired`].
	StartDebounce(ChatId),

	CancelDebounce(ChatId),

	/// Run `POST /messages` and resolve via [`Engine::message_posted`].
	PostMessage {
		ticket: PostTicket,
		request: NewMessageRequest,
	},

	/// Run `DELETE /messages/{id}` and resolve via
	/// [`Engine::message_deleted`].
	DeleteMessage {
		chat: ChatId,
		message: MessageId,
		for_everyone: bool,
	},

	/// Run `POST /upload`, reporting progress via
	/// [`Engine::upload_progress`] and resolving via
	/// [`Engine::upload_finished`].
	StartUpload {
		file: FileSource,
	},

	/// Transient user-facing notice.
	Notify {
		text: String,
	},
}

/// Client-side realtime synchronization engine: reconciles REST history
/// with realtime deltas, drives typing presence, notification
/// aggregation and the compose/upload lifecycle.
pub struct Engine {
	session: SessionContext,
	registry: ChatRegistry,
	store: MessageStore,
	typing: TypingCoordinator,
	notifications: NotificationAggregator,
	composer: Composer,
	uploader: AttachmentUploader,

	/// Send phase per outgoing message id (local id until the ack, then
	/// the server-assigned id).
	outgoing: HashMap<MessageId, SendPhase>,

	connected: bool,
	clock: SharedClock,
}

impl Engine {
	pub fn new(session: SessionContext, clock: SharedClock) -> Self {
		Self {
			session,
			registry: ChatRegistry::new(),
			store: MessageStore::new(),
			typing: TypingCoordinator::new(),
			notifications: NotificationAggregator::new(),
			composer: Composer::new(),
			uploader: AttachmentUploader::new(),
			outgoing: HashMap::new(),
			connected: false,
			clock,
		}
	}

	pub fn session(&self) -> &SessionContext {
		&self.session
	}

	pub fn is_connected(&self) -> bool {
		self.connected
	}

	/// Seed / refresh the chat list from `GET /chats`.
	pub fn set_chats(&mut self, chats: Vec<Chat>) {
		self.registry.set_chats(chats);
	}

	/// Insert the result of an access-or-create call.
	pub fn upsert_chat(&mut self, chat: Chat) {
		self.registry.upsert(chat);
	}

	/// Chats ordered by recency of their latest message.
	pub fn chats(&self) -> Vec<&Chat> {
		self.registry.list()
	}

	pub fn active_chat(&self) -> Option<&ChatId> {
		self.registry.active().filter(|chat| self.registry.get(chat).is_some())
	}

	pub fn log(&self, chat: &ChatId) -> &[Message] {
		self.store.log(chat)
	}

	pub fn draft(&self) -> &str {
		self.composer.draft()
	}

	pub fn reply_context(&self) -> Option<&ReplySnapshot> {
		self.composer.reply_to()
	}

	pub fn notifications(&self) -> &[NotificationEntry] {
		self.notifications.entries()
	}

	pub fn badge_count(&self) -> usize {
		self.notifications.len()
	}

	/// Explicit user action: drop every queued notification.
	pub fn clear_all_notifications(&mut self) {
		self.notifications.clear_all();
	}

	pub fn upload_task(&self) -> Option<&UploadTask> {
		self.uploader.task()
	}

	pub fn send_phase(&self, message: &MessageId) -> Option<SendPhase> {
		self.outgoing.get(message).copied()
	}

	/// Peers currently typing in the active chat. Other chats' typing
	/// state is tracked but never surfaced.
	pub fn typists(&self) -> Vec<parley_domain::UserId> {
		let Some(chat) = self.registry.active() else {
			return Vec::new();
		};
		self.typing.typists(chat, self.clock.now())
	}

	/// Change (or clear) the active chat.
	///
	/// Leaves the previous room, cancels its debounce timer, joins the
	/// new room and starts the history fetch. Re-selecting the same chat
	/// goes through the full leave/join/fetch cycle; both room calls are
	/// idempotent.
	pub fn select_chat(&mut self, target: Option<ChatId>) -> Vec<Action> {
		let mut actions = Vec::new();

		if let Some(previous) = self.registry.active().cloned() {
			if self.typing.cancel_local(&previous) {
				actions.push(Action::Publish(ClientEvent::StopTyping {
					chat_id: previous.clone(),
				}));
			}
			actions.push(Action::CancelDebounce(previous.clone()));
			actions.push(Action::LeaveRoom(previous));
		}

		self.composer.clear_reply();
		self.registry.set_active(target.clone());

		if let Some(chat) = target {
			self.notifications.clear(&chat);
			let ticket = self.store.begin_fetch(chat.clone());
			actions.push(Action::FetchHistory(ticket));
			actions.push(Action::JoinRoom(chat));
		}

		actions
	}

	/// Resolution of a history fetch. Stale responses (superseded fetch
	/// or changed active chat) are discarded silently.
	pub fn history_fetched(&mut self, ticket: FetchTicket, result: Result<Vec<Message>, ApiError>) -> Vec<Action> {
		match result {
			Ok(messages) => {
				let outcome = self.store.complete_fetch(&ticket, messages, self.registry.active());
				debug!(chat = %ticket.chat, ?outcome, "history fetch resolved");
				Vec::new()
			}
			Err(err) => {
				warn!(chat = %ticket.chat, error = %err, "history fetch failed");
				self.store.abandon_fetch(&ticket);
				vec![Action::Notify {
					text: "Failed to load messages".to_string(),
				}]
			}
		}
	}

	/// Content-changing input event: update the draft and drive the
	/// typing debounce. Typing is only emitted once the handshake
	/// completed.
	pub fn input_changed(&mut self, text: &str) -> Vec<Action> {
		self.composer.set_draft(text);

		let Some(chat) = self.registry.active().cloned() else {
			return Vec::new();
		};
		if !self.connected {
			return Vec::new();
		}

		let mut actions = Vec::new();
		if self.typing.keystroke(&chat, self.clock.now()) {
			actions.push(Action::Publish(ClientEvent::Typing { chat_id: chat.clone() }));
		}
		actions.push(Action::StartDebounce(chat));
		actions
	}

	/// The debounce timer for `chat` fired.
	pub fn debounce_fired(&mut self, chat: ChatId) -> Vec<Action> {
		if self.typing.debounce_fired(&chat, self.clock.now()) {
			vec![Action::Publish(ClientEvent::StopTyping { chat_id: chat })]
		} else {
			Vec::new()
		}
	}

	/// Mark a message as the reply context for the next send.
	pub fn reply_to_message(&mut self, chat: &ChatId, message: &MessageId) -> bool {
		let Some(original) = self.store.log(chat).iter().find(|m| &m.id == message) else {
			return false;
		};
		self.composer.set_reply(ReplySnapshot::of(original));
		true
	}

	pub fn cancel_reply(&mut self) {
		self.composer.clear_reply();
	}

	/// Attachment selection. Any file is accepted; preview kind is
	/// derived from the MIME type.
	pub fn select_file(&mut self, file: FileSource) -> Result<PreviewKind, ClientError> {
		self.uploader.select_file(file).map(|task| task.preview)
	}

	pub fn cancel_upload(&mut self) -> bool {
		self.uploader.cancel()
	}

	/// Begin uploading the selected file.
	pub fn start_upload(&mut self) -> Vec<Action> {
		match self.uploader.begin() {
			Ok(file) => vec![Action::StartUpload { file }],
			Err(err) => vec![Action::Notify { text: err.to_string() }],
		}
	}

	pub fn upload_progress(&mut self, percent: u8) {
		self.uploader.progress(percent);
	}

	pub fn upload_finished(&mut self, result: Result<Attachment, ApiError>) -> Vec<Action> {
		match result {
			Ok(descriptor) => {
				self.uploader.finished(Ok(descriptor));
				Vec::new()
			}
			Err(err) => {
				warn!(error = %err, "upload failed");
				self.uploader.finished(Err(ClientError::Api(err)));
				vec![Action::Notify {
					text: "Upload failed; please reselect the file".to_string(),
				}]
			}
		}
	}

	/// Send the composed message to the active chat.
	///
	/// The input clears synchronously; an optimistic pending entry lands
	/// in the log before the REST call resolves.
	pub fn send(&mut self) -> Vec<Action> {
		let Some(chat) = self.registry.active().cloned() else {
			return Vec::new();
		};

		let attachment = self.uploader.take_descriptor();
		let draft = match self.composer.take(attachment) {
			Ok(draft) => draft,
			Err(err) => {
				return vec![Action::Notify { text: err.to_string() }];
			}
		};

		let mut actions = Vec::new();
		if self.typing.cancel_local(&chat) {
			actions.push(Action::Publish(ClientEvent::StopTyping { chat_id: chat.clone() }));
			actions.push(Action::CancelDebounce(chat.clone()));
		}

		let local = Message {
			id: MessageId::new_local(),
			chat_id: chat.clone(),
			sender: self.session.as_participant(),
			content: draft.content.clone(),
			attachment: draft.attachment.clone(),
			reply_to: draft.reply_to.clone(),
			created_at: Utc::now(),
			delivery: parley_domain::DeliveryState::Pending,
		};

		let request = NewMessageRequest {
			content: draft.content,
			chat_id: chat.clone(),
			reply_to: draft.reply_to.map(|r| ReplyDto {
				sender_name: r.sender_name,
				content: r.content,
			}),
			file_url: draft.attachment.as_ref().map(|a| a.url.clone()),
			file_type: draft.attachment.as_ref().map(|a| a.mime_type.clone()),
			file_name: draft.attachment.as_ref().map(|a| a.file_name.clone()),
		};

		let ticket = PostTicket {
			chat,
			local_id: local.id.clone(),
		};
		self.outgoing.insert(local.id.clone(), SendPhase::Sending);
		self.store.append_local(local);

		actions.push(Action::PostMessage { ticket, request });
		actions
	}

	/// Resolution of `POST /messages`.
	pub fn message_posted(&mut self, ticket: PostTicket, result: Result<Message, ApiError>) -> Vec<Action> {
		match result {
			Ok(acked) => {
				self.outgoing.remove(&ticket.local_id);
				self.outgoing.insert(acked.id.clone(), SendPhase::Sent);
				self.store.resolve_pending(&ticket.chat, &ticket.local_id, acked.clone());
				self.registry.record_latest(&acked);
				vec![Action::Publish(ClientEvent::NewMessage(Box::new(MessageDto::from(&acked))))]
			}
			Err(err) => {
				warn!(chat = %ticket.chat, error = %err, "send failed");
				self.outgoing.insert(ticket.local_id.clone(), SendPhase::Failed);
				self.store.mark_failed(&ticket.chat, &ticket.local_id);
				vec![Action::Notify {
					text: "Failed to send the message".to_string(),
				}]
			}
		}
	}

	/// Resubmit a failed message. The original content, attachment and
	/// reply snapshot were preserved on the failed entry.
	pub fn retry_message(&mut self, chat: &ChatId, local_id: &MessageId) -> Vec<Action> {
		let Some(failed) = self
			.store
			.log(chat)
			.iter()
			.find(|m| &m.id == local_id && m.delivery == parley_domain::DeliveryState::Failed)
			.cloned()
		else {
			return Vec::new();
		};

		let request = NewMessageRequest {
			content: failed.content.clone(),
			chat_id: chat.clone(),
			reply_to: failed.reply_to.as_ref().map(|r| ReplyDto {
				sender_name: r.sender_name.clone(),
				content: r.content.clone(),
			}),
			file_url: failed.attachment.as_ref().map(|a| a.url.clone()),
			file_type: failed.attachment.as_ref().map(|a| a.mime_type.clone()),
			file_name: failed.attachment.as_ref().map(|a| a.file_name.clone()),
		};

		self.store.mark_pending(chat, local_id);
		self.outgoing.insert(local_id.clone(), SendPhase::Sending);

		vec![Action::PostMessage {
			ticket: PostTicket {
				chat: chat.clone(),
				local_id: local_id.clone(),
			},
			request,
		}]
	}

	/// Delete a message (for-me or for-everyone).
	pub fn delete_message(&mut self, chat: ChatId, message: MessageId, for_everyone: bool) -> Vec<Action> {
		vec![Action::DeleteMessage {
			chat,
			message,
			for_everyone,
		}]
	}

	/// Resolution of `DELETE /messages/{id}`.
	pub fn message_deleted(&mut self, chat: &ChatId, message: &MessageId, result: Result<(), ApiError>) -> Vec<Action> {
		match result {
			Ok(()) => {
				self.store.remove(chat, message);
				Vec::new()
			}
			Err(err) => {
				warn!(%chat, %message, error = %err, "delete failed");
				vec![Action::Notify {
					text: "Failed to delete the message".to_string(),
				}]
			}
		}
	}

	/// Client-side guards for group creation.
	pub fn group_request(&self, name: &str, users: Vec<parley_domain::UserId>) -> Result<NewGroupChatRequest, ClientError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(ClientError::InvalidGroup("group name must be non-empty".to_string()));
		}
		if users.len() < 2 {
			return Err(ClientError::InvalidGroup("select at least 2 users".to_string()));
		}
		Ok(NewGroupChatRequest {
			name: name.to_string(),
			users,
		})
	}

	/// Dispatch one realtime event.
	pub fn handle_server_event(&mut self, event: ServerEvent) -> Vec<Action> {
		match event {
			ServerEvent::Connected => {
				self.connected = true;
				Vec::new()
			}
			ServerEvent::Typing { chat_id, user_id } => {
				if &user_id != self.session.user_id() {
					self.typing.remote_typing(&chat_id, user_id, self.clock.now());
				}
				Vec::new()
			}
			ServerEvent::StopTyping { chat_id, user_id } => {
				self.typing.remote_stop(&chat_id, &user_id);
				Vec::new()
			}
			ServerEvent::MessageReceived(dto) => {
				let message = dto.into_message();

				// Own echo: terminal phase transition, then routed like
				// any other delivery (deduped by id).
				if let Some(phase) = self.outgoing.get_mut(&message.id)
					&& *phase == SendPhase::Sent
				{
					*phase = SendPhase::Echoed;
				}

				self.registry.record_latest(&message);

				if self.registry.active() == Some(&message.chat_id) {
					self.store.append_live(message);
				} else {
					let label = self
						.registry
						.get(&message.chat_id)
						.map(|c| c.label(self.session.user_id()))
						.unwrap_or_else(|| message.chat_id.to_string());
					self.notifications.push(message, label);
				}
				Vec::new()
			}
		}
	}
}

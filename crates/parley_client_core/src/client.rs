#![forbid(unsafe_code)]

//! Async runtime around [`Engine`]: executes the actions it requests and
//! feeds resolved REST calls, socket events and timer firings back in.

use std::collections::HashMap;
use std::sync::Arc;

use parley_domain::{Chat, ChatId, Identity, Message, MessageId, UserId};
use parley_net::{ApiClient, ApiError, FileSource, SocketConfig, SocketHandle, SocketSubscription};
use parley_protocol::ServerEvent;
use tokio::sync::{mpsc, watch};
use tracing::info;
use url::Url;

use crate::config::ClientConfig;
use crate::engine::{Action, Engine};
use crate::error::ClientError;
use crate::services::{SharedApi, SystemClock};
use crate::session::SessionContext;
use crate::typing::TYPING_IDLE;
use crate::upload::PreviewKind;

struct ClientInner {
	engine: parking_lot::Mutex<Engine>,
	api: SharedApi,
	socket: SocketHandle,

	/// One pending debounce timer per chat, replaced on each keystroke.
	debounce: parking_lot::Mutex<HashMap<ChatId, tokio::task::JoinHandle<()>>>,

	/// Transient user-facing notices, drained by the embedder.
	notices: parking_lot::Mutex<Vec<String>>,
}

/// End-user chat client: owns the session's engine, REST client and
/// realtime connection. Dropping the client releases the connection and
/// unsubscribes its handler.
pub struct ChatClient {
	inner: Arc<ClientInner>,
	_subscription: SocketSubscription,
	pump: tokio::task::JoinHandle<()>,
}

impl Drop for ChatClient {
	fn drop(&mut self) {
		self.pump.abort();
		self.inner.socket.close();
	}
}

impl ChatClient {
	/// Log in and connect. Seeds the chat registry over REST and starts
	/// consuming realtime events.
	pub async fn start(config: &ClientConfig, identity: Identity) -> Result<Self, ClientError> {
		let session = SessionContext::login(identity)?;

		let base_url = Url::parse(&config.api_base_url).map_err(|e| ApiError::Url(e.to_string()))?;
		let socket_url = Url::parse(&config.socket_url).map_err(|e| ApiError::Url(e.to_string()))?;

		let api: SharedApi = Arc::new(ApiClient::new(base_url, session.token().clone())?);
		let socket = SocketHandle::open(
			SocketConfig {
				url: socket_url,
				connect_timeout: config.connect_timeout(),
			},
			session.setup_dto(),
		);

		Self::with_parts(api, socket, session).await
	}

	/// Assemble from pre-built parts (tests inject fakes here).
	pub async fn with_parts(api: SharedApi, socket: SocketHandle, session: SessionContext) -> Result<Self, ClientError> {
		let mut engine = Engine::new(session, Arc::new(SystemClock));
		engine.set_chats(api.list_chats().await?);

		let (subscription, events) = socket.subscribe();

		let inner = Arc::new(ClientInner {
			engine: parking_lot::Mutex::new(engine),
			api,
			socket,
			debounce: parking_lot::Mutex::new(HashMap::new()),
			notices: parking_lot::Mutex::new(Vec::new()),
		});

		let pump = spawn_event_pump(Arc::clone(&inner), events);

		Ok(Self {
			inner,
			_subscription: subscription,
			pump,
		})
	}

	/// Read access to the engine state.
	pub fn with_engine<R>(&self, f: impl FnOnce(&Engine) -> R) -> R {
		f(&self.inner.engine.lock())
	}

	pub fn chats(&self) -> Vec<Chat> {
		self.with_engine(|e| e.chats().into_iter().cloned().collect())
	}

	pub fn active_chat(&self) -> Option<ChatId> {
		self.with_engine(|e| e.active_chat().cloned())
	}

	pub fn log(&self, chat: &ChatId) -> Vec<Message> {
		self.with_engine(|e| e.log(chat).to_vec())
	}

	pub fn badge_count(&self) -> usize {
		self.with_engine(|e| e.badge_count())
	}

	/// Drain queued transient notices.
	pub fn take_notices(&self) -> Vec<String> {
		std::mem::take(&mut *self.inner.notices.lock())
	}

	/// Additional observer stream of raw realtime events. Multiple
	/// handlers are supported; the guard unsubscribes on drop.
	pub fn subscribe_events(&self) -> (SocketSubscription, mpsc::UnboundedReceiver<ServerEvent>) {
		self.inner.socket.subscribe()
	}

	pub fn select_chat(&self, chat: Option<ChatId>) {
		let actions = self.inner.engine.lock().select_chat(chat);
		run_actions(&self.inner, actions);
	}

	pub fn input_changed(&self, text: &str) {
		let actions = self.inner.engine.lock().input_changed(text);
		run_actions(&self.inner, actions);
	}

	pub fn send(&self) {
		let actions = self.inner.engine.lock().send();
		run_actions(&self.inner, actions);
	}

	pub fn retry_message(&self, chat: &ChatId, local_id: &MessageId) {
		let actions = self.inner.engine.lock().retry_message(chat, local_id);
		run_actions(&self.inner, actions);
	}

	pub fn delete_message(&self, chat: ChatId, message: MessageId, for_everyone: bool) {
		let actions = self.inner.engine.lock().delete_message(chat, message, for_everyone);
		run_actions(&self.inner, actions);
	}

	pub fn reply_to_message(&self, chat: &ChatId, message: &MessageId) -> bool {
		self.inner.engine.lock().reply_to_message(chat, message)
	}

	pub fn cancel_reply(&self) {
		self.inner.engine.lock().cancel_reply();
	}

	pub fn select_file(&self, file: FileSource) -> Result<PreviewKind, ClientError> {
		self.inner.engine.lock().select_file(file)
	}

	pub fn start_upload(&self) {
		let actions = self.inner.engine.lock().start_upload();
		run_actions(&self.inner, actions);
	}

	pub fn cancel_upload(&self) -> bool {
		self.inner.engine.lock().cancel_upload()
	}

	pub fn clear_all_notifications(&self) {
		self.inner.engine.lock().clear_all_notifications();
	}

	/// Access-or-create a direct chat with `user`, then select it.
	pub async fn access_chat(&self, user: &UserId) -> Result<ChatId, ClientError> {
		let chat = self.inner.api.access_chat(user).await?;
		let id = chat.id.clone();
		let actions = {
			let mut engine = self.inner.engine.lock();
			engine.upsert_chat(chat);
			engine.select_chat(Some(id.clone()))
		};
		run_actions(&self.inner, actions);
		Ok(id)
	}

	/// Create a group chat, then select it.
	pub async fn create_group_chat(&self, name: &str, users: Vec<UserId>) -> Result<ChatId, ClientError> {
		let request = self.inner.engine.lock().group_request(name, users)?;
		let chat = self.inner.api.create_group_chat(&request).await?;
		let id = chat.id.clone();
		let actions = {
			let mut engine = self.inner.engine.lock();
			engine.upsert_chat(chat);
			engine.select_chat(Some(id.clone()))
		};
		run_actions(&self.inner, actions);
		Ok(id)
	}

	/// Re-seed the chat list over REST.
	pub async fn refresh_chats(&self) -> Result<(), ClientError> {
		let chats = self.inner.api.list_chats().await?;
		self.inner.engine.lock().set_chats(chats);
		Ok(())
	}
}

fn spawn_event_pump(
	inner: Arc<ClientInner>,
	mut events: mpsc::UnboundedReceiver<ServerEvent>,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(event) = events.recv().await {
			let actions = inner.engine.lock().handle_server_event(event);
			run_actions(&inner, actions);
		}
		info!("realtime event stream ended");
	})
}

fn run_actions(inner: &Arc<ClientInner>, actions: Vec<Action>) {
	for action in actions {
		match action {
			Action::FetchHistory(ticket) => {
				let inner = Arc::clone(inner);
				tokio::spawn(async move {
					let result = inner.api.fetch_messages(&ticket.chat).await;
					let follow = inner.engine.lock().history_fetched(ticket, result);
					run_actions(&inner, follow);
				});
			}

			Action::JoinRoom(chat) => inner.socket.join_room(chat),

			Action::LeaveRoom(chat) => inner.socket.leave_room(chat),

			Action::Publish(event) => inner.socket.publish(event),

			Action::StartDebounce(chat) => {
				let task_inner = Arc::clone(inner);
				let task_chat = chat.clone();
				let handle = tokio::spawn(async move {
					tokio::time::sleep(TYPING_IDLE).await;
					let follow = task_inner.engine.lock().debounce_fired(task_chat);
					run_actions(&task_inner, follow);
				});

				// A new keystroke replaces, never stacks, the timer.
				if let Some(previous) = inner.debounce.lock().insert(chat, handle) {
					previous.abort();
				}
			}

			Action::CancelDebounce(chat) => {
				if let Some(handle) = inner.debounce.lock().remove(&chat) {
					handle.abort();
				}
			}

			Action::PostMessage { ticket, request } => {
				let inner = Arc::clone(inner);
				tokio::spawn(async move {
					let result = inner.api.send_message(&request).await;
					let follow = inner.engine.lock().message_posted(ticket, result);
					run_actions(&inner, follow);
				});
			}

			Action::DeleteMessage {
				chat,
				message,
				for_everyone,
			} => {
				let inner = Arc::clone(inner);
				tokio::spawn(async move {
					let result = inner.api.delete_message(&message, for_everyone).await;
					let follow = inner.engine.lock().message_deleted(&chat, &message, result);
					run_actions(&inner, follow);
				});
			}

			Action::StartUpload { file } => {
				let inner = Arc::clone(inner);
				tokio::spawn(async move {
					let (progress_tx, mut progress_rx) = watch::channel(0u8);

					let progress_inner = Arc::clone(&inner);
					tokio::spawn(async move {
						while progress_rx.changed().await.is_ok() {
							let percent = *progress_rx.borrow();
							progress_inner.engine.lock().upload_progress(percent);
						}
					});

					let result = inner.api.upload(file, progress_tx).await;
					let follow = inner.engine.lock().upload_finished(result);
					run_actions(&inner, follow);
				});
			}

			Action::Notify { text } => {
				info!(notice = %text, "transient notice");
				inner.notices.lock().push(text);
			}
		}
	}
}

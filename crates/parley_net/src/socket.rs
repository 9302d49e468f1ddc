#![forbid(unsafe_code)]

//! Realtime connection actor.
//!
//! One connection per session, owned by a spawned task and driven through
//! a command channel. The handle is cheap to clone; cloning never opens a
//! second socket. Joined rooms are tracked actor-side and replayed after
//! every reconnect, so a dropped transport does not silently lose room
//! membership.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_domain::ChatId;
use parley_protocol::{ClientEvent, ServerEvent, SetupDto, decode_server_event, encode_client_event};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::reconnect::backoff_delay;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime socket configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
	/// `ws://` / `wss://` endpoint.
	pub url: Url,

	/// Timeout for the transport connect.
	pub connect_timeout: Duration,
}

impl SocketConfig {
	pub fn new(url: Url) -> Self {
		Self {
			url,
			connect_timeout: Duration::from_secs(10),
		}
	}
}

#[derive(Debug)]
enum Command {
	Publish {
		event: ClientEvent,
	},
	Join {
		chat: ChatId,
	},
	Leave {
		chat: ChatId,
	},
	Subscribe {
		handler_id: u64,
		handler: mpsc::UnboundedSender<ServerEvent>,
	},
	Unsubscribe {
		handler_id: u64,
	},
	Close,
}

/// Handle to the session's realtime connection.
#[derive(Clone)]
pub struct SocketHandle {
	command_tx: mpsc::UnboundedSender<Command>,
	handler_seq: Arc<AtomicU64>,
}

impl SocketHandle {
	/// Open the connection for a session. The returned handle is the only
	/// way to reach the socket; dropping every clone shuts the actor down.
	pub fn open(config: SocketConfig, setup: SetupDto) -> Self {
		let (command_tx, command_rx) = mpsc::unbounded_channel();
		tokio::spawn(run_socket_task(config, setup, command_rx));
		Self {
			command_tx,
			handler_seq: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Fire-and-forget publish.
	pub fn publish(&self, event: ClientEvent) {
		let _ = self.command_tx.send(Command::Publish { event });
	}

	/// Join a chat room. Idempotent: re-joining a joined room is a no-op.
	pub fn join_room(&self, chat: ChatId) {
		let _ = self.command_tx.send(Command::Join { chat });
	}

	/// Leave a chat room. Idempotent. The wire has no leave event;
	/// dropping the room from the joined set stops the reconnect replay.
	pub fn leave_room(&self, chat: ChatId) {
		let _ = self.command_tx.send(Command::Leave { chat });
	}

	/// Register a handler for incoming events. The subscription guard
	/// unregisters on drop; keeping a handler past its view's lifetime is
	/// how stale-handler bugs happen.
	pub fn subscribe(&self) -> (SocketSubscription, mpsc::UnboundedReceiver<ServerEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let handler_id = self.handler_seq.fetch_add(1, Ordering::Relaxed);
		let _ = self.command_tx.send(Command::Subscribe {
			handler_id,
			handler: tx,
		});
		(
			SocketSubscription {
				handler_id,
				command_tx: self.command_tx.clone(),
			},
			rx,
		)
	}

	/// Close the connection and stop the actor.
	pub fn close(&self) {
		let _ = self.command_tx.send(Command::Close);
	}
}

/// Scoped handler registration; unregisters on drop.
pub struct SocketSubscription {
	handler_id: u64,
	command_tx: mpsc::UnboundedSender<Command>,
}

impl Drop for SocketSubscription {
	fn drop(&mut self) {
		let _ = self.command_tx.send(Command::Unsubscribe {
			handler_id: self.handler_id,
		});
	}
}

#[derive(Default)]
struct SocketState {
	handlers: HashMap<u64, mpsc::UnboundedSender<ServerEvent>>,
	joined: HashSet<ChatId>,
}

impl SocketState {
	fn dispatch(&mut self, event: ServerEvent) {
		self.handlers.retain(|_, handler| handler.send(event.clone()).is_ok());
	}

	/// Apply a command while disconnected. Publishes are dropped
	/// (fire-and-forget); membership and handler changes still apply so
	/// the next connect starts from the right state.
	fn apply_offline(&mut self, cmd: Command) -> bool {
		match cmd {
			Command::Publish { event } => {
				debug!(event = event.name(), "dropping publish while disconnected");
			}
			Command::Join { chat } => {
				self.joined.insert(chat);
			}
			Command::Leave { chat } => {
				self.joined.remove(&chat);
			}
			Command::Subscribe {
				handler_id,
				handler,
			} => {
				self.handlers.insert(handler_id, handler);
			}
			Command::Unsubscribe { handler_id } => {
				self.handlers.remove(&handler_id);
			}
			Command::Close => return false,
		}
		true
	}
}

async fn run_socket_task(config: SocketConfig, setup: SetupDto, mut command_rx: mpsc::UnboundedReceiver<Command>) {
	let mut state = SocketState::default();
	let mut attempt: u32 = 0;

	'reconnect: loop {
		info!(url = %config.url, "connecting realtime socket");
		let connect = tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(config.url.as_str()));
		let mut ws: WsStream = match connect.await {
			Ok(Ok((ws, _))) => ws,
			Ok(Err(err)) => {
				warn!(error = %err, "realtime connect failed");
				attempt = attempt.saturating_add(1);
				if !wait_for_retry(&mut state, &mut command_rx, attempt).await {
					return;
				}
				continue 'reconnect;
			}
			Err(_) => {
				warn!(timeout = ?config.connect_timeout, "realtime connect timed out");
				attempt = attempt.saturating_add(1);
				if !wait_for_retry(&mut state, &mut command_rx, attempt).await {
					return;
				}
				continue 'reconnect;
			}
		};

		// Identity handshake, then replay room membership. The server
		// answers with `connected`, which is dispatched like any event.
		if !send_event(&mut ws, &ClientEvent::Setup(setup.clone())).await {
			attempt = attempt.saturating_add(1);
			if !wait_for_retry(&mut state, &mut command_rx, attempt).await {
				return;
			}
			continue 'reconnect;
		}
		for chat in state.joined.clone() {
			if !send_event(&mut ws, &ClientEvent::JoinChat { chat_id: chat }).await {
				attempt = attempt.saturating_add(1);
				if !wait_for_retry(&mut state, &mut command_rx, attempt).await {
					return;
				}
				continue 'reconnect;
			}
		}
		attempt = 0;
		info!(joined = state.joined.len(), "realtime socket ready");

		loop {
			tokio::select! {
				cmd = command_rx.recv() => {
					let Some(cmd) = cmd else {
						debug!("all socket handles dropped; closing");
						let _ = ws.close(None).await;
						return;
					};

					match cmd {
						Command::Publish { event } => {
							if !send_event(&mut ws, &event).await {
								break;
							}
						}
						Command::Join { chat } => {
							if state.joined.insert(chat.clone())
								&& !send_event(&mut ws, &ClientEvent::JoinChat { chat_id: chat }).await
							{
								break;
							}
						}
						Command::Leave { chat } => {
							state.joined.remove(&chat);
						}
						Command::Subscribe { handler_id, handler } => {
							state.handlers.insert(handler_id, handler);
						}
						Command::Unsubscribe { handler_id } => {
							state.handlers.remove(&handler_id);
						}
						Command::Close => {
							let _ = ws.close(None).await;
							return;
						}
					}
				}

				msg = ws.next() => {
					let Some(msg) = msg else {
						warn!("realtime socket closed by peer");
						break;
					};
					match msg {
						Ok(Message::Text(text)) => match decode_server_event(&text) {
							Ok(event) => state.dispatch(event),
							Err(err) => debug!(error = %err, "ignoring undecodable frame"),
						},
						Ok(Message::Close(frame)) => {
							warn!(?frame, "realtime socket close frame");
							break;
						}
						Ok(_) => {}
						Err(err) => {
							warn!(error = %err, "realtime socket error");
							break;
						}
					}
				}
			}
		}

		attempt = attempt.saturating_add(1);
		if !wait_for_retry(&mut state, &mut command_rx, attempt).await {
			return;
		}
	}
}

async fn send_event(ws: &mut WsStream, event: &ClientEvent) -> bool {
	let text = match encode_client_event(event) {
		Ok(text) => text,
		Err(err) => {
			warn!(error = %err, event = event.name(), "failed to encode event");
			return true;
		}
	};

	if let Err(err) = ws.send(Message::Text(text.into())).await {
		warn!(error = %err, event = event.name(), "realtime send failed");
		return false;
	}
	true
}

/// Sleep out the backoff while still applying state-changing commands.
/// Returns false when the actor should shut down.
async fn wait_for_retry(
	state: &mut SocketState,
	command_rx: &mut mpsc::UnboundedReceiver<Command>,
	attempt: u32,
) -> bool {
	let delay = backoff_delay(attempt);
	debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
	let deadline = tokio::time::Instant::now() + delay;

	loop {
		tokio::select! {
			_ = tokio::time::sleep_until(deadline) => return true,
			cmd = command_rx.recv() => {
				let Some(cmd) = cmd else { return false };
				if !state.apply_offline(cmd) {
					return false;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chat(s: &str) -> ChatId {
		ChatId::new(s).expect("chat id")
	}

	#[test]
	fn offline_join_and_leave_adjust_replay_set() {
		let mut state = SocketState::default();

		assert!(state.apply_offline(Command::Join { chat: chat("c1") }));
		assert!(state.apply_offline(Command::Join { chat: chat("c1") }));
		assert!(state.apply_offline(Command::Join { chat: chat("c2") }));
		assert_eq!(state.joined.len(), 2);

		assert!(state.apply_offline(Command::Leave { chat: chat("c1") }));
		assert!(!state.joined.contains(&chat("c1")));
		assert!(state.joined.contains(&chat("c2")));
	}

	#[test]
	fn offline_close_stops_the_actor() {
		let mut state = SocketState::default();
		assert!(!state.apply_offline(Command::Close));
	}

	#[test]
	fn dispatch_prunes_dropped_handlers() {
		let mut state = SocketState::default();
		let (tx_live, mut rx_live) = mpsc::unbounded_channel();
		let (tx_dead, rx_dead) = mpsc::unbounded_channel();
		drop(rx_dead);

		state.handlers.insert(1, tx_live);
		state.handlers.insert(2, tx_dead);

		state.dispatch(ServerEvent::Connected);

		assert_eq!(state.handlers.len(), 1);
		assert_eq!(rx_live.try_recv().expect("delivered"), ServerEvent::Connected);
	}

	#[test]
	fn subscription_guard_unsubscribes_on_drop() {
		let (command_tx, mut command_rx) = mpsc::unbounded_channel();
		let handle = SocketHandle {
			command_tx,
			handler_seq: Arc::new(AtomicU64::new(1)),
		};

		let (guard, _rx) = handle.subscribe();
		let sub_cmd = command_rx.try_recv().expect("subscribe command");
		let subscribed_id = match sub_cmd {
			Command::Subscribe { handler_id, .. } => handler_id,
			other => panic!("unexpected command: {other:?}"),
		};

		drop(guard);
		match command_rx.try_recv().expect("unsubscribe command") {
			Command::Unsubscribe { handler_id } => assert_eq!(handler_id, subscribed_id),
			other => panic!("unexpected command: {other:?}"),
		}
	}
}

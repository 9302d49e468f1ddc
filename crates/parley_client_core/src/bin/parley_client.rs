#![forbid(unsafe_code)]

use parley_client_core::{ChatClient, ClientConfig};
use parley_domain::{ChatId, Identity, Role, SecretToken, UserId};
use parley_protocol::ServerEvent;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_client --token TOKEN --user USER_ID --name NAME [--api URL] [--socket URL] [--chat CHAT_ID]\n\
\n\
Options:\n\
	--token    Bearer token issued at login (required)\n\
	--user     Session user id (required)\n\
	--name     Display name (required)\n\
	--api      REST base URL (default: from config / http://localhost:5000)\n\
	--socket   Realtime ws:// URL (default: from config / ws://localhost:5000)\n\
	--chat     Chat id to select on startup\n\
	--help     Show this help\n\
\n\
Examples:\n\
	parley_client --token abc --user 66f0... --name Ada --chat 66f1...\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,parley_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

struct Args {
	config: ClientConfig,
	identity: Identity,
	chat: Option<ChatId>,
}

fn parse_args() -> Args {
	let mut config = ClientConfig::load();
	let mut token: Option<String> = None;
	let mut user: Option<String> = None;
	let mut name: Option<String> = None;
	let mut chat: Option<String> = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--token" => token = Some(it.next().unwrap_or_else(|| usage_and_exit())),
			"--user" => user = Some(it.next().unwrap_or_else(|| usage_and_exit())),
			"--name" => name = Some(it.next().unwrap_or_else(|| usage_and_exit())),
			"--api" => config.api_base_url = it.next().unwrap_or_else(|| usage_and_exit()),
			"--socket" => config.socket_url = it.next().unwrap_or_else(|| usage_and_exit()),
			"--chat" => chat = Some(it.next().unwrap_or_else(|| usage_and_exit())),
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let (Some(token), Some(user), Some(name)) = (token, user, name) else {
		usage_and_exit()
	};

	let user_id = UserId::new(user).unwrap_or_else(|e| {
		eprintln!("Invalid --user value: {e}");
		usage_and_exit()
	});
	let chat = chat.map(|c| {
		ChatId::new(c).unwrap_or_else(|e| {
			eprintln!("Invalid --chat value: {e}");
			usage_and_exit()
		})
	});

	Args {
		config,
		identity: Identity {
			id: user_id,
			display_name: name,
			avatar_url: None,
			token: SecretToken::new(token),
			role: Role::User,
		},
		chat,
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let client = ChatClient::start(&args.config, args.identity).await?;

	for chat in client.chats() {
		let latest = chat
			.latest_message
			.as_ref()
			.map(|m| m.content.clone())
			.unwrap_or_else(|| "(no messages)".to_string());
		info!(chat = %chat.id, %latest, "chat");
	}

	if let Some(chat) = args.chat {
		client.select_chat(Some(chat));
	}

	let (_guard, mut events) = client.subscribe_events();

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("shutting down");
				break;
			}
			event = events.recv() => {
				match event {
					Some(ServerEvent::MessageReceived(msg)) => {
						info!(chat = %msg.chat.id, sender = %msg.sender.name, content = %msg.content, "message");
					}
					Some(ServerEvent::Typing { chat_id, user_id }) => {
						info!(chat = %chat_id, user = %user_id, "typing");
					}
					Some(ServerEvent::StopTyping { chat_id, user_id }) => {
						info!(chat = %chat_id, user = %user_id, "stopped typing");
					}
					Some(ServerEvent::Connected) => {
						info!("realtime handshake complete");
					}
					None => {
						warn!("event stream closed");
						break;
					}
				}
			}
		}
	}

	Ok(())
}

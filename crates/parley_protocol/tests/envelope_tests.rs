use chrono::{TimeZone, Utc};
use parley_domain::{ChatId, UserId};
use parley_protocol::wire::{ChatRefDto, MessageDto, UserDto};
use parley_protocol::{ClientEvent, ServerEvent, SetupDto, decode_server_event, encode_client_event, event};
use proptest::prelude::*;

fn message_dto(id: &str, chat: &str, content: &str) -> MessageDto {
	MessageDto {
		id: id.parse().expect("message id"),
		sender: UserDto {
			id: UserId::new("u1").expect("user id"),
			name: "Ada".to_string(),
			email: None,
			pic: None,
		},
		content: content.to_string(),
		chat: ChatRefDto {
			id: ChatId::new(chat).expect("chat id"),
		},
		created_at: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
		file_url: None,
		file_type: None,
		file_name: None,
		reply_to: None,
	}
}

#[test]
fn published_new_message_decodes_as_received_echo() {
	// The server relays a "new message" publish back to room members as
	// "message received" with the same payload.
	let dto = message_dto("m1", "c1", "hello there");
	let published = encode_client_event(&ClientEvent::NewMessage(Box::new(dto.clone()))).expect("encode");

	let v: serde_json::Value = serde_json::from_str(&published).expect("json");
	assert_eq!(v["event"], event::NEW_MESSAGE);

	let echo = serde_json::json!({ "event": event::MESSAGE_RECEIVED, "data": v["data"] }).to_string();
	match decode_server_event(&echo).expect("decode") {
		ServerEvent::MessageReceived(received) => assert_eq!(*received, dto),
		other => panic!("unexpected event: {other:?}"),
	}
}

#[test]
fn every_client_event_name_matches_the_envelope() {
	let events = vec![
		ClientEvent::Setup(SetupDto {
			user_id: UserId::new("u1").unwrap(),
			name: "Ada".to_string(),
		}),
		ClientEvent::JoinChat {
			chat_id: ChatId::new("c1").unwrap(),
		},
		ClientEvent::NewMessage(Box::new(message_dto("m1", "c1", "x"))),
		ClientEvent::Typing {
			chat_id: ChatId::new("c1").unwrap(),
		},
		ClientEvent::StopTyping {
			chat_id: ChatId::new("c1").unwrap(),
		},
	];

	for ev in events {
		let text = encode_client_event(&ev).expect("encode");
		let v: serde_json::Value = serde_json::from_str(&text).expect("json");
		assert_eq!(v["event"], ev.name());
	}
}

#[test]
fn stop_typing_roundtrip_keeps_ids() {
	let raw = r#"{"event":"stop typing","data":{"chatId":"c3","userId":"u7"}}"#;
	match decode_server_event(raw).expect("decode") {
		ServerEvent::StopTyping { chat_id, user_id } => {
			assert_eq!(chat_id.as_str(), "c3");
			assert_eq!(user_id.as_str(), "u7");
		}
		other => panic!("unexpected event: {other:?}"),
	}
}

proptest! {
	#[test]
	fn message_content_survives_the_envelope(content in "\\PC{0,200}") {
		let dto = message_dto("m1", "c1", &content);
		let published = encode_client_event(&ClientEvent::NewMessage(Box::new(dto))).expect("encode");
		let v: serde_json::Value = serde_json::from_str(&published).expect("json");

		let echo = serde_json::json!({ "event": event::MESSAGE_RECEIVED, "data": v["data"] }).to_string();
		match decode_server_event(&echo).expect("decode") {
			ServerEvent::MessageReceived(received) => prop_assert_eq!(received.content, content),
			other => panic!("unexpected event: {other:?}"),
		}
	}

	#[test]
	fn typing_chat_id_survives_the_envelope(chat in "[a-f0-9]{1,24}") {
		let ev = ClientEvent::Typing { chat_id: ChatId::new(chat.clone()).unwrap() };
		let text = encode_client_event(&ev).expect("encode");
		let v: serde_json::Value = serde_json::from_str(&text).expect("json");
		prop_assert_eq!(v["data"]["chatId"].as_str(), Some(chat.as_str()));
	}
}

#![forbid(unsafe_code)]

use bytes::Bytes;
use futures_util::StreamExt;
use parley_domain::{Attachment, Chat, ChatId, Message, MessageId, Participant, SecretToken, UserId};
use parley_protocol::wire::{
	ChatDto, DeleteMessageRequest, MessageDto, NewGroupChatRequest, NewMessageRequest, UploadResponseDto, UserDto,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

const CHATS_PATH: &str = "/chats";
const MESSAGES_PATH: &str = "/messages";
const ACCESS_CHAT_PATH: &str = "/chat";
const GROUP_CHAT_PATH: &str = "/chat/group";
const UPLOAD_PATH: &str = "/upload";
const ADMIN_USERS_PATH: &str = "/admin/users";
const ADMIN_CHATS_PATH: &str = "/admin/chats";
const ADMIN_USER_PATH: &str = "/admin/user";

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Errors from the REST API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	/// The server rejected the bearer token.
	#[error("auth rejected (status={status})")]
	AuthRejected { status: StatusCode },

	/// Transport-level failure (connect, timeout, body read).
	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	/// Unexpected non-success status.
	#[error("unexpected status {status}: {body}")]
	Status { status: StatusCode, body: String },

	/// Response body did not match the expected shape.
	#[error("decode error: {0}")]
	Decode(#[from] serde_json::Error),

	#[error("invalid url: {0}")]
	Url(String),
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct FileSource {
	pub file_name: String,
	pub mime_type: Option<String>,
	pub bytes: Bytes,
}

/// REST client for the chat backend. Every call carries the session's
/// bearer token.
#[derive(Clone, Debug)]
pub struct ApiClient {
	http: reqwest::Client,
	base_url: Url,
	token: SecretToken,
}

impl ApiClient {
	pub fn new(base_url: Url, token: SecretToken) -> Result<Self, ApiError> {
		let http = reqwest::Client::builder()
			.user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self { http, base_url, token })
	}

	fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		req.header("Authorization", format!("Bearer {}", self.token.expose()))
	}

	fn url(&self, path_and_query: &str) -> Result<Url, ApiError> {
		self.base_url
			.join(path_and_query)
			.map_err(|e| ApiError::Url(format!("{path_and_query}: {e}")))
	}

	async fn read_checked(resp: reqwest::Response, label: &'static str) -> Result<String, ApiError> {
		let status = resp.status();

		if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
			return Err(ApiError::AuthRejected { status });
		}

		let body = resp.text().await?;
		if !status.is_success() {
			return Err(ApiError::Status { status, body });
		}

		debug!(%label, %status, "rest call succeeded");
		Ok(body)
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str, label: &'static str) -> Result<T, ApiError> {
		let url = self.url(path)?;
		let resp = self.authed(self.http.get(url)).send().await?;
		let body = Self::read_checked(resp, label).await?;
		Ok(serde_json::from_str(&body)?)
	}

	async fn post_json<B: Serialize, T: DeserializeOwned>(
		&self,
		path: &str,
		body: &B,
		label: &'static str,
	) -> Result<T, ApiError> {
		let url = self.url(path)?;
		let resp = self.authed(self.http.post(url)).json(body).send().await?;
		let body = Self::read_checked(resp, label).await?;
		Ok(serde_json::from_str(&body)?)
	}

	/// `GET /chats` — the chats visible to this session.
	pub async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
		let chats: Vec<ChatDto> = self.get_json(CHATS_PATH, "GET /chats").await?;
		Ok(chats.into_iter().map(ChatDto::into_chat).collect())
	}

	/// `GET /messages/{chatId}` — full history for one chat.
	pub async fn fetch_messages(&self, chat: &ChatId) -> Result<Vec<Message>, ApiError> {
		let path = format!("{MESSAGES_PATH}/{}", chat.as_str());
		let messages: Vec<MessageDto> = self.get_json(&path, "GET /messages/{chatId}").await?;
		Ok(messages.into_iter().map(MessageDto::into_message).collect())
	}

	/// `POST /messages` — create a message; returns the acknowledged
	/// message with its server-assigned id.
	pub async fn send_message(&self, request: &NewMessageRequest) -> Result<Message, ApiError> {
		let dto: MessageDto = self.post_json(MESSAGES_PATH, request, "POST /messages").await?;
		Ok(dto.into_message())
	}

	/// `POST /chat` — access-or-create a direct chat with `user`.
	pub async fn access_chat(&self, user: &UserId) -> Result<Chat, ApiError> {
		let body = serde_json::json!({ "userId": user });
		let dto: ChatDto = self.post_json(ACCESS_CHAT_PATH, &body, "POST /chat").await?;
		Ok(dto.into_chat())
	}

	/// `POST /chat/group` — create a group chat.
	pub async fn create_group_chat(&self, request: &NewGroupChatRequest) -> Result<Chat, ApiError> {
		let dto: ChatDto = self.post_json(GROUP_CHAT_PATH, request, "POST /chat/group").await?;
		Ok(dto.into_chat())
	}

	/// `DELETE /messages/{id}` — delete-for-me or delete-for-everyone.
	pub async fn delete_message(&self, message: &MessageId, delete_for_everyone: bool) -> Result<(), ApiError> {
		let url = self.url(&format!("{MESSAGES_PATH}/{}", message.as_str()))?;
		let body = DeleteMessageRequest { delete_for_everyone };
		let resp = self.authed(self.http.delete(url)).json(&body).send().await?;
		Self::read_checked(resp, "DELETE /messages/{id}").await?;
		Ok(())
	}

	/// `POST /upload` — multipart file upload with progress reporting.
	///
	/// Progress is driven by the request body stream: 0–100 is published
	/// on `progress` as chunks are handed to the transport, with a final
	/// 100 once the server has answered.
	pub async fn upload(&self, file: FileSource, progress: watch::Sender<u8>) -> Result<Attachment, ApiError> {
		let url = self.url(UPLOAD_PATH)?;

		let total = file.bytes.len().max(1);
		let content_length = file.bytes.len() as u64;
		let mime = file
			.mime_type
			.clone()
			.unwrap_or_else(|| "application/octet-stream".to_string());

		let mut chunks: Vec<Bytes> = Vec::with_capacity(file.bytes.len() / UPLOAD_CHUNK_SIZE + 1);
		let mut offset = 0usize;
		while offset < file.bytes.len() {
			let end = (offset + UPLOAD_CHUNK_SIZE).min(file.bytes.len());
			chunks.push(file.bytes.slice(offset..end));
			offset = end;
		}

		let chunk_progress = progress.clone();
		let mut sent = 0usize;
		let body_stream = futures_util::stream::iter(chunks).map(move |chunk: Bytes| {
			sent += chunk.len();
			let pct = ((sent as u64 * 100) / total as u64).min(100) as u8;
			let _ = chunk_progress.send(pct);
			Ok::<Bytes, std::io::Error>(chunk)
		});

		let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body_stream), content_length)
			.file_name(file.file_name.clone())
			.mime_str(&mime)?;
		let form = reqwest::multipart::Form::new().part("file", part);

		let resp = self.authed(self.http.post(url)).multipart(form).send().await?;
		let body = Self::read_checked(resp, "POST /upload").await?;
		let parsed: UploadResponseDto = serde_json::from_str(&body)?;

		let _ = progress.send(100);
		Ok(parsed.into())
	}

	/// `GET /admin/users` — elevated user listing.
	pub async fn admin_users(&self) -> Result<Vec<Participant>, ApiError> {
		let users: Vec<UserDto> = self.get_json(ADMIN_USERS_PATH, "GET /admin/users").await?;
		Ok(users.into_iter().map(Participant::from).collect())
	}

	/// `GET /admin/chats` — elevated chat listing across all users.
	pub async fn admin_chats(&self) -> Result<Vec<Chat>, ApiError> {
		let chats: Vec<ChatDto> = self.get_json(ADMIN_CHATS_PATH, "GET /admin/chats").await?;
		Ok(chats.into_iter().map(ChatDto::into_chat).collect())
	}

	/// `DELETE /admin/user/{id}` — terminate a user account.
	pub async fn terminate_user(&self, user: &UserId) -> Result<(), ApiError> {
		let url = self.url(&format!("{ADMIN_USER_PATH}/{}", user.as_str()))?;
		let resp = self.authed(self.http.delete(url)).send().await?;
		Self::read_checked(resp, "DELETE /admin/user/{id}").await?;
		Ok(())
	}
}

#![forbid(unsafe_code)]

//! Seams between the engine and the outside world, so tests can inject
//! fakes for the REST API and time.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parley_domain::{Attachment, Chat, ChatId, Message, MessageId, Participant, UserId};
use parley_net::{ApiClient, ApiError, FileSource};
use parley_protocol::wire::{NewGroupChatRequest, NewMessageRequest};
use tokio::sync::watch;

/// The REST surface consumed by the core.
#[async_trait]
pub trait ChatApi: Send + Sync {
	async fn list_chats(&self) -> Result<Vec<Chat>, ApiError>;
	async fn fetch_messages(&self, chat: &ChatId) -> Result<Vec<Message>, ApiError>;
	async fn send_message(&self, request: &NewMessageRequest) -> Result<Message, ApiError>;
	async fn access_chat(&self, user: &UserId) -> Result<Chat, ApiError>;
	async fn create_group_chat(&self, request: &NewGroupChatRequest) -> Result<Chat, ApiError>;
	async fn delete_message(&self, message: &MessageId, for_everyone: bool) -> Result<(), ApiError>;
	async fn upload(&self, file: FileSource, progress: watch::Sender<u8>) -> Result<Attachment, ApiError>;
	async fn admin_users(&self) -> Result<Vec<Participant>, ApiError>;
	async fn admin_chats(&self) -> Result<Vec<Chat>, ApiError>;
	async fn terminate_user(&self, user: &UserId) -> Result<(), ApiError>;
}

#[async_trait]
impl ChatApi for ApiClient {
	async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
		ApiClient::list_chats(self).await
	}

	async fn fetch_messages(&self, chat: &ChatId) -> Result<Vec<Message>, ApiError> {
		ApiClient::fetch_messages(self, chat).await
	}

	async fn send_message(&self, request: &NewMessageRequest) -> Result<Message, ApiError> {
		ApiClient::send_message(self, request).await
	}

	async fn access_chat(&self, user: &UserId) -> Result<Chat, ApiError> {
		ApiClient::access_chat(self, user).await
	}

	async fn create_group_chat(&self, request: &NewGroupChatRequest) -> Result<Chat, ApiError> {
		ApiClient::create_group_chat(self, request).await
	}

	async fn delete_message(&self, message: &MessageId, for_everyone: bool) -> Result<(), ApiError> {
		ApiClient::delete_message(self, message, for_everyone).await
	}

	async fn upload(&self, file: FileSource, progress: watch::Sender<u8>) -> Result<Attachment, ApiError> {
		ApiClient::upload(self, file, progress).await
	}

	async fn admin_users(&self) -> Result<Vec<Participant>, ApiError> {
		ApiClient::admin_users(self).await
	}

	async fn admin_chats(&self) -> Result<Vec<Chat>, ApiError> {
		ApiClient::admin_chats(self).await
	}

	async fn terminate_user(&self, user: &UserId) -> Result<(), ApiError> {
		ApiClient::terminate_user(self, user).await
	}
}

pub trait Clock: Send + Sync {
	fn now(&self) -> Instant;
}

#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

pub type SharedApi = Arc<dyn ChatApi>;
pub type SharedClock = Arc<dyn Clock>;

#![forbid(unsafe_code)]

use parley_domain::{Attachment, ReplySnapshot};

use crate::error::ClientError;

/// Per-message send lifecycle, tracked by the engine per outgoing id:
/// Composing → Sending → Sent (REST ack) → Echoed (own broadcast
/// observed, deduped, terminal). A REST failure parks the message in
/// `Failed` with its content intact so it can be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
	Sending,
	Sent,
	Echoed,
	Failed,
}

/// A validated draft, taken from the composer at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedDraft {
	pub content: String,
	pub attachment: Option<Attachment>,
	pub reply_to: Option<ReplySnapshot>,
}

/// Builds outgoing messages: draft text plus optional reply context.
/// The attachment descriptor comes from `AttachmentUploader` at take
/// time.
#[derive(Debug, Default)]
pub struct Composer {
	draft: String,
	reply_to: Option<ReplySnapshot>,
}

impl Composer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn draft(&self) -> &str {
		&self.draft
	}

	pub fn set_draft(&mut self, text: impl Into<String>) {
		self.draft = text.into();
	}

	pub fn reply_to(&self) -> Option<&ReplySnapshot> {
		self.reply_to.as_ref()
	}

	pub fn set_reply(&mut self, snapshot: ReplySnapshot) {
		self.reply_to = Some(snapshot);
	}

	pub fn clear_reply(&mut self) {
		self.reply_to = None;
	}

	/// Validate and take the draft, clearing the input synchronously —
	/// before any server response. Requires non-empty content or an
	/// attachment; with an attachment and no text, the content defaults
	/// to the file name.
	pub fn take(&mut self, attachment: Option<Attachment>) -> Result<ComposedDraft, ClientError> {
		let content = self.draft.trim().to_string();
		if content.is_empty() && attachment.is_none() {
			return Err(ClientError::EmptyMessage);
		}

		let content = if content.is_empty() {
			attachment.as_ref().map(|a| a.file_name.clone()).unwrap_or_default()
		} else {
			content
		};

		self.draft.clear();
		let reply_to = self.reply_to.take();

		Ok(ComposedDraft {
			content,
			attachment,
			reply_to,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn attachment(name: &str) -> Attachment {
		Attachment {
			url: format!("http://files/{name}"),
			mime_type: "image/png".to_string(),
			file_name: name.to_string(),
		}
	}

	#[test]
	fn empty_draft_without_attachment_is_rejected() {
		let mut c = Composer::new();
		c.set_draft("   ");
		assert!(matches!(c.take(None), Err(ClientError::EmptyMessage)));
	}

	#[test]
	fn take_clears_the_input_synchronously() {
		let mut c = Composer::new();
		c.set_draft("hello");
		let draft = c.take(None).unwrap();
		assert_eq!(draft.content, "hello");
		assert_eq!(c.draft(), "");
	}

	#[test]
	fn empty_content_with_attachment_defaults_to_the_file_name() {
		let mut c = Composer::new();
		let draft = c.take(Some(attachment("report.png"))).unwrap();
		assert_eq!(draft.content, "report.png");
		assert_eq!(draft.attachment.unwrap().file_name, "report.png");
	}

	#[test]
	fn reply_context_is_taken_with_the_draft() {
		let mut c = Composer::new();
		c.set_draft("answer");
		c.set_reply(ReplySnapshot {
			sender_name: "Bob".to_string(),
			content: "question".to_string(),
		});

		let draft = c.take(None).unwrap();
		assert_eq!(draft.reply_to.unwrap().sender_name, "Bob");
		assert!(c.reply_to().is_none(), "reply context consumed");
	}

	#[test]
	fn clear_reply_cancels_the_context() {
		let mut c = Composer::new();
		c.set_reply(ReplySnapshot {
			sender_name: "Bob".to_string(),
			content: "question".to_string(),
		});
		c.clear_reply();
		assert!(c.reply_to().is_none());
	}
}

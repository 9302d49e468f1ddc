#![forbid(unsafe_code)]

use parley_domain::Attachment;
use parley_net::FileSource;

use crate::error::ClientError;

/// Upload lifecycle: file select → preview → progressive upload →
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
	/// Selected, preview available, upload not started.
	Selecting,
	Uploading,
	Done,
	/// Upload failed; the pending send is aborted and the user must
	/// reselect. No automatic retry.
	Failed,
}

/// Local preview classification for the selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
	Image,
	Video,
	None,
}

#[derive(Debug, Clone)]
pub struct UploadTask {
	pub file: FileSource,
	pub preview: PreviewKind,
	pub status: UploadStatus,
	pub progress_percent: u8,
	pub descriptor: Option<Attachment>,
}

/// At most one task per compose session.
#[derive(Debug, Default)]
pub struct AttachmentUploader {
	task: Option<UploadTask>,
}

fn preview_kind(file: &FileSource) -> PreviewKind {
	let mime = file
		.mime_type
		.clone()
		.or_else(|| mime_guess::from_path(&file.file_name).first().map(|m| m.to_string()));

	match mime {
		Some(m) if m.starts_with("image/") => PreviewKind::Image,
		Some(m) if m.starts_with("video/") => PreviewKind::Video,
		_ => PreviewKind::None,
	}
}

impl AttachmentUploader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn task(&self) -> Option<&UploadTask> {
		self.task.as_ref()
	}

	/// Accept a file (no size/type validation) and classify its preview.
	/// Replaces any previous selection, but never an in-flight upload.
	pub fn select_file(&mut self, file: FileSource) -> Result<&UploadTask, ClientError> {
		if matches!(self.task.as_ref().map(|t| t.status), Some(UploadStatus::Uploading)) {
			return Err(ClientError::UploadInFlight);
		}

		let preview = preview_kind(&file);
		self.task = Some(UploadTask {
			file,
			preview,
			status: UploadStatus::Selecting,
			progress_percent: 0,
			descriptor: None,
		});
		Ok(self.task.as_ref().expect("task just set"))
	}

	/// Cancel the current task. Allowed any time except while the upload
	/// is in flight.
	pub fn cancel(&mut self) -> bool {
		match self.task.as_ref().map(|t| t.status) {
			Some(UploadStatus::Uploading) | None => false,
			_ => {
				self.task = None;
				true
			}
		}
	}

	/// Transition to `Uploading` and hand the file to the caller for the
	/// actual transfer.
	pub fn begin(&mut self) -> Result<FileSource, ClientError> {
		let task = self.task.as_mut().ok_or(ClientError::UploadInFlight)?;
		if task.status != UploadStatus::Selecting {
			return Err(ClientError::UploadInFlight);
		}
		task.status = UploadStatus::Uploading;
		task.progress_percent = 0;
		Ok(task.file.clone())
	}

	pub fn progress(&mut self, percent: u8) {
		if let Some(task) = self.task.as_mut()
			&& task.status == UploadStatus::Uploading
		{
			task.progress_percent = percent.min(100);
		}
	}

	pub fn finished(&mut self, result: Result<Attachment, ClientError>) {
		let Some(task) = self.task.as_mut() else {
			return;
		};
		match result {
			Ok(descriptor) => {
				task.status = UploadStatus::Done;
				task.progress_percent = 100;
				task.descriptor = Some(descriptor);
			}
			Err(_) => {
				task.status = UploadStatus::Failed;
				task.descriptor = None;
			}
		}
	}

	/// Consume the finished descriptor for a send. Clears the task.
	pub fn take_descriptor(&mut self) -> Option<Attachment> {
		if self.task.as_ref().map(|t| t.status) != Some(UploadStatus::Done) {
			return None;
		}
		self.task.take().and_then(|t| t.descriptor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	fn file(name: &str, mime: Option<&str>) -> FileSource {
		FileSource {
			file_name: name.to_string(),
			mime_type: mime.map(|m| m.to_string()),
			bytes: Bytes::from_static(b"data"),
		}
	}

	fn attachment(name: &str) -> Attachment {
		Attachment {
			url: format!("http://files/{name}"),
			mime_type: "image/png".to_string(),
			file_name: name.to_string(),
		}
	}

	#[test]
	fn preview_classifies_image_video_and_other() {
		let mut up = AttachmentUploader::new();
		assert_eq!(
			up.select_file(file("a.png", Some("image/png"))).unwrap().preview,
			PreviewKind::Image
		);
		assert_eq!(
			up.select_file(file("b.mp4", Some("video/mp4"))).unwrap().preview,
			PreviewKind::Video
		);
		assert_eq!(
			up.select_file(file("c.pdf", Some("application/pdf"))).unwrap().preview,
			PreviewKind::None
		);
	}

	#[test]
	fn preview_falls_back_to_the_file_name() {
		let mut up = AttachmentUploader::new();
		assert_eq!(up.select_file(file("shot.jpeg", None)).unwrap().preview, PreviewKind::Image);
	}

	#[test]
	fn full_upload_lifecycle() {
		let mut up = AttachmentUploader::new();
		up.select_file(file("a.png", Some("image/png"))).unwrap();

		let f = up.begin().unwrap();
		assert_eq!(f.file_name, "a.png");
		assert_eq!(up.task().unwrap().status, UploadStatus::Uploading);

		up.progress(40);
		assert_eq!(up.task().unwrap().progress_percent, 40);

		up.finished(Ok(attachment("a.png")));
		let task = up.task().unwrap();
		assert_eq!(task.status, UploadStatus::Done);
		assert_eq!(task.progress_percent, 100);

		let descriptor = up.take_descriptor().unwrap();
		assert_eq!(descriptor.file_name, "a.png");
		assert!(up.task().is_none(), "consumed by the send");
	}

	#[test]
	fn cancel_only_before_the_upload_starts() {
		let mut up = AttachmentUploader::new();
		up.select_file(file("a.png", None)).unwrap();
		assert!(up.cancel());

		up.select_file(file("b.png", None)).unwrap();
		up.begin().unwrap();
		assert!(!up.cancel(), "not cancelable once started");
	}

	#[test]
	fn failure_aborts_the_pending_send() {
		let mut up = AttachmentUploader::new();
		up.select_file(file("a.png", None)).unwrap();
		up.begin().unwrap();
		up.finished(Err(ClientError::UploadInFlight));

		assert_eq!(up.task().unwrap().status, UploadStatus::Failed);
		assert!(up.take_descriptor().is_none());
	}

	#[test]
	fn selecting_over_an_inflight_upload_is_rejected() {
		let mut up = AttachmentUploader::new();
		up.select_file(file("a.png", None)).unwrap();
		up.begin().unwrap();

		let err = up.select_file(file("b.png", None)).unwrap_err();
		assert!(matches!(err, ClientError::UploadInFlight));
	}
}

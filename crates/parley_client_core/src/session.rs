#![forbid(unsafe_code)]

use parley_domain::{Identity, Participant, Role, SecretToken, UserId};
use parley_protocol::SetupDto;

use crate::error::ClientError;

/// Holds the active identity and its token for the session lifetime.
///
/// Created at login, dropped at logout. Every other component borrows
/// identity data from here; nothing else owns a token.
#[derive(Debug, Clone)]
pub struct SessionContext {
	identity: Identity,
}

impl SessionContext {
	/// Start a session. A missing token is a fatal precondition for every
	/// operation, so it is rejected up front.
	pub fn login(identity: Identity) -> Result<Self, ClientError> {
		if identity.token.expose().trim().is_empty() {
			return Err(ClientError::AuthMissing);
		}
		Ok(Self { identity })
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn user_id(&self) -> &UserId {
		&self.identity.id
	}

	pub fn token(&self) -> &SecretToken {
		&self.identity.token
	}

	pub fn is_admin(&self) -> bool {
		self.identity.role == Role::Admin
	}

	/// The session user as a message participant.
	pub fn as_participant(&self) -> Participant {
		Participant {
			id: self.identity.id.clone(),
			display_name: self.identity.display_name.clone(),
			avatar_url: self.identity.avatar_url.clone(),
		}
	}

	/// Identity handshake payload for the realtime connection.
	pub fn setup_dto(&self) -> SetupDto {
		SetupDto {
			user_id: self.identity.id.clone(),
			name: self.identity.display_name.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn identity(token: &str, role: Role) -> Identity {
		Identity {
			id: UserId::new("u1").unwrap(),
			display_name: "Ada".to_string(),
			avatar_url: None,
			token: SecretToken::new(token),
			role,
		}
	}

	#[test]
	fn login_rejects_missing_token() {
		let err = SessionContext::login(identity("  ", Role::User)).unwrap_err();
		assert!(matches!(err, ClientError::AuthMissing));
	}

	#[test]
	fn login_accepts_user_and_admin() {
		let user = SessionContext::login(identity("tok", Role::User)).unwrap();
		assert!(!user.is_admin());

		let admin = SessionContext::login(identity("tok", Role::Admin)).unwrap();
		assert!(admin.is_admin());
	}

	#[test]
	fn setup_dto_carries_identity() {
		let s = SessionContext::login(identity("tok", Role::User)).unwrap();
		let dto = s.setup_dto();
		assert_eq!(dto.user_id.as_str(), "u1");
		assert_eq!(dto.name, "Ada");
	}
}

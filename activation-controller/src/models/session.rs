use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Current authenticated principal as handed out by the auth backend.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<String>,
    pub access_token: Secret<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<UserId>,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            access_token: Secret::new(access_token.into()),
            expires_at,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// The user a request runs on behalf of, with the bearer token the
/// backend authorizes it by.
#[derive(Debug, Clone)]
pub struct AccessScope {
    pub user_id: UserId,
    pub access_token: Secret<String>,
}

impl AccessScope {
    pub fn new(user_id: impl Into<UserId>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: Secret::new(access_token.into()),
        }
    }
}

impl From<&Session> for AccessScope {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.clone(),
            access_token: session.access_token.clone(),
        }
    }
}

impl PartialEq for AccessScope {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl Eq for AccessScope {}

/// Lifecycle event kinds emitted by the auth backend alongside the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl std::fmt::Display for AuthChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthChangeEvent::InitialSession => write!(f, "INITIAL_SESSION"),
            AuthChangeEvent::SignedIn => write!(f, "SIGNED_IN"),
            AuthChangeEvent::SignedOut => write!(f, "SIGNED_OUT"),
            AuthChangeEvent::TokenRefreshed => write!(f, "TOKEN_REFRESHED"),
            AuthChangeEvent::UserUpdated => write!(f, "USER_UPDATED"),
            AuthChangeEvent::PasswordRecovery => write!(f, "PASSWORD_RECOVERY"),
        }
    }
}

/// One notification delivered through a session subscription.
#[derive(Debug, Clone)]
pub struct AuthNotification {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// What the rest of the controller sees of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Authenticated(AccessScope),
    Unauthenticated,
}

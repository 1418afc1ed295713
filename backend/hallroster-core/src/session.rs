// src/session.rs
//
// Signup/login over the `users` collection and an in-memory table of live
// session tokens. Passwords are compared as stored; hardening credential
// handling is out of scope here.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::UserAccount;
use crate::store::{fetch_all, Collection, Record, SharedStore, StoreError};

const SESSION_TOKEN_LEN: usize = 48;
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0\d{9}$").expect("phone pattern is valid"));

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("email {0} is already registered")]
    EmailTaken(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub phone: String,
}

impl SignupRequest {
    fn validate(&self) -> Result<(), SessionError> {
        let fail = |message: &str| Err(SessionError::Validation(message.to_string()));
        if [
            &self.full_name,
            &self.email,
            &self.password,
            &self.confirm_password,
            &self.phone,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
        {
            return fail("All fields are required.");
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return fail("Email address is not valid.");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return fail("Password must be at least 6 characters.");
        }
        if self.password != self.confirm_password {
            return fail("Passwords do not match.");
        }
        if !PHONE_RE.is_match(self.phone.trim()) {
            return fail("Phone number must be 10 digits starting with 0.");
        }
        Ok(())
    }
}

/// A user's public view; the stored password is never echoed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&UserAccount> for UserSummary {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role.clone(),
            active: user.active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub started_at: DateTime<Utc>,
}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct SessionGate {
    store: SharedStore,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Session {
    fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.started_at >= ttl
    }
}

impl SessionGate {
    /// Tokens stop validating `ttl` after login.
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self {
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    async fn users(&self) -> Result<Vec<UserAccount>, SessionError> {
        Ok(fetch_all::<UserAccount>(self.store.as_ref()).await?)
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<UserSummary, SessionError> {
        request.validate()?;
        let email = request.email.trim().to_lowercase();
        if self.users().await?.iter().any(|u| u.email.to_lowercase() == email) {
            warn!("Signup rejected: {} already registered", email);
            return Err(SessionError::EmailTaken(email));
        }

        let mut user = UserAccount {
            id: String::new(),
            full_name: request.full_name.trim().to_string(),
            email,
            password: request.password,
            phone: request.phone.trim().to_string(),
            created_at: Some(Utc::now()),
            role: "user".to_string(),
            active: true,
        };
        user.id = self
            .store
            .create_one(Collection::Users, user.to_fields()?)
            .await?;
        info!("Registered user {} ({})", user.id, user.email);
        Ok(UserSummary::from(&user))
    }

    /// Returns a fresh session token for matching credentials.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(String, UserSummary), SessionError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(SessionError::Validation("All fields are required.".to_string()));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(SessionError::Validation("Email address is not valid.".to_string()));
        }

        let user = self
            .users()
            .await?
            .into_iter()
            .find(|u| u.email.to_lowercase() == email && u.password == password)
            .ok_or_else(|| {
                warn!("Failed login for {}", email);
                SessionError::InvalidCredentials
            })?;

        let token = generate_token();
        let mut sessions = self.sessions.lock().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, session| !session.expired(now, self.ttl));
        if sessions.len() < before {
            debug!("Pruned {} expired session(s)", before - sessions.len());
        }
        sessions.insert(
            token.clone(),
            Session {
                user_id: user.id.clone(),
                email: user.email.clone(),
                started_at: now,
            },
        );
        drop(sessions);
        info!("User {} logged in", user.email);
        Ok((token, UserSummary::from(&user)))
    }

    pub async fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.lock().await.remove(token);
        if let Some(session) = &removed {
            info!("User {} logged out", session.email);
        }
        removed.is_some()
    }

    /// The live session for `token`. An expired token is dropped.
    pub async fn validate(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(token).cloned() else {
            debug!("Unknown session token presented");
            return None;
        };
        if session.expired(Utc::now(), self.ttl) {
            info!("Session for {} expired", session.email);
            sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// Users, optionally filtered by a case-insensitive match on name,
    /// email or phone.
    pub async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserSummary>, SessionError> {
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        Ok(self
            .users()
            .await?
            .iter()
            .filter(|user| match &needle {
                Some(needle) => {
                    user.full_name.to_lowercase().contains(needle.as_str())
                        || user.email.to_lowercase().contains(needle.as_str())
                        || user.phone.contains(needle.as_str())
                }
                None => true,
            })
            .map(UserSummary::from)
            .collect())
    }

    /// Removes the account and ends its live sessions.
    pub async fn delete_user(&self, id: &str) -> Result<(), SessionError> {
        self.store
            .delete_one(Collection::Users, id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => SessionError::UserNotFound(id.to_string()),
                other => SessionError::Store(other),
            })?;
        self.sessions
            .lock()
            .await
            .retain(|_, session| session.user_id != id);
        info!("Deleted user {}", id);
        Ok(())
    }
}

//! Admin session layer: operator accounts, password checks and bearer tokens.
//!
//! Tokens are 32 random bytes, hex encoded, stored server side with an expiry. Passwords are
//! stored as bcrypt hashes; expired sessions are swept on every login.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{Operator, OperatorId};
use super::repository::{NewOperator, OperatorStore, OperatorUpdate, RepositoryError, SessionRecord};

const TOKEN_BYTES: usize = 32;
pub const DEFAULT_ROLE: &str = "admin";

/// Token lifetimes for regular and "remember me" logins, plus the bcrypt work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub token_ttl: Duration,
    pub remember_ttl: Duration,
    pub password_cost: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            token_ttl: Duration::hours(24),
            remember_ttl: Duration::days(30),
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Bearer credential returned by a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub operator: Operator,
}

/// Requested changes to an operator account. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperatorChanges {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Authenticates operators and resolves bearer tokens to them.
pub struct AdminSessions<S> {
    store: Arc<S>,
    policy: SessionPolicy,
}

impl<S> AdminSessions<S>
where
    S: OperatorStore + 'static,
{
    pub fn new(store: Arc<S>, policy: SessionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
        origin: &str,
    ) -> Result<SessionGrant, SessionError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(SessionError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let credentials = match self.store.operator_by_email(&email)? {
            Some(credentials) if credentials.operator.active => credentials,
            _ => {
                warn!(%email, %origin, "admin login rejected");
                return Err(SessionError::InvalidCredentials);
            }
        };
        if !verify_password(password, &credentials.password_hash) {
            warn!(%email, %origin, "admin login rejected");
            return Err(SessionError::InvalidCredentials);
        }

        let now = Utc::now();
        let purged = self.store.purge_expired_sessions(now)?;
        if purged > 0 {
            debug!(purged, "expired admin sessions removed");
        }

        let ttl = if remember {
            self.policy.remember_ttl
        } else {
            self.policy.token_ttl
        };
        let token = random_hex(TOKEN_BYTES);
        let expires_at = now + ttl;
        self.store.insert_session(SessionRecord {
            token: token.clone(),
            operator: credentials.operator.id,
            origin: origin.to_string(),
            created_at: now,
            expires_at,
        })?;
        self.store.record_login(credentials.operator.id, now)?;

        let mut operator = credentials.operator;
        operator.last_login_at = Some(now);
        info!(email = %operator.email, %origin, "admin login");

        Ok(SessionGrant {
            token,
            expires_at,
            operator,
        })
    }

    /// Resolve a bearer token to an active operator.
    pub fn verify(&self, token: &str) -> Result<Operator, SessionError> {
        self.verify_at(token, Utc::now())
    }

    pub(crate) fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Operator, SessionError> {
        let session = self
            .store
            .session(token)?
            .ok_or(SessionError::Unauthorized("unknown session"))?;
        if session.expires_at <= now {
            return Err(SessionError::Unauthorized("session expired"));
        }
        let operator = self
            .store
            .operator(session.operator)?
            .ok_or(SessionError::Unauthorized("unknown session"))?;
        if !operator.active {
            return Err(SessionError::Unauthorized("account disabled"));
        }
        Ok(operator)
    }

    pub fn logout(&self, token: &str) -> Result<(), SessionError> {
        self.store.delete_session(token)?;
        Ok(())
    }

    pub fn create_operator(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Option<&str>,
    ) -> Result<Operator, SessionError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') || password.is_empty() {
            return Err(SessionError::Validation(
                "email and password are required".to_string(),
            ));
        }
        let role = role
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(DEFAULT_ROLE);

        let operator = self
            .store
            .insert_operator(NewOperator {
                email,
                display_name: display_name.trim().to_string(),
                role: role.to_string(),
                password_hash: hash_password(password, self.policy.password_cost)?,
                created_at: Utc::now(),
            })
            .map_err(duplicate_email)?;
        info!(email = %operator.email, role = %operator.role, "operator created");
        Ok(operator)
    }

    /// Apply `changes` to an operator. A new password is rehashed before it is stored.
    pub fn update_operator(
        &self,
        id: OperatorId,
        changes: OperatorChanges,
    ) -> Result<Operator, SessionError> {
        let email = match changes.email {
            Some(email) => {
                let email = normalize_email(&email);
                if email.is_empty() || !email.contains('@') {
                    return Err(SessionError::Validation(
                        "a valid email is required".to_string(),
                    ));
                }
                Some(email)
            }
            None => None,
        };
        let password_hash = match changes.password.filter(|password| !password.is_empty()) {
            Some(password) => Some(hash_password(&password, self.policy.password_cost)?),
            None => None,
        };
        let update = OperatorUpdate {
            email,
            display_name: changes.display_name.map(|name| name.trim().to_string()),
            role: changes
                .role
                .map(|role| role.trim().to_string())
                .filter(|role| !role.is_empty()),
            password_hash,
            active: changes.active,
        };

        let operator = self
            .store
            .update_operator(id, update)
            .map_err(|err| match err {
                RepositoryError::NotFound => SessionError::UnknownOperator(id.0),
                other => duplicate_email(other),
            })?;
        info!(
            operator = operator.id.0,
            email = %operator.email,
            active = operator.active,
            "operator updated"
        );
        Ok(operator)
    }

    /// Delete an operator account. Operators cannot delete themselves.
    pub fn delete_operator(&self, actor: OperatorId, id: OperatorId) -> Result<(), SessionError> {
        if actor == id {
            return Err(SessionError::Validation(
                "cannot delete your own account".to_string(),
            ));
        }
        self.store.delete_operator(id).map_err(|err| match err {
            RepositoryError::NotFound => SessionError::UnknownOperator(id.0),
            other => other.into(),
        })?;
        info!(operator = id.0, by = actor.0, "operator deleted");
        Ok(())
    }

    pub fn list_operators(&self) -> Result<Vec<Operator>, SessionError> {
        Ok(self.store.list_operators()?)
    }

    /// Create the first operator when the account table is empty. Returns `None` when
    /// operators already exist.
    pub fn bootstrap_admin(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Operator>, SessionError> {
        if self.store.operator_count()? > 0 {
            return Ok(None);
        }
        self.create_operator(email, password, display_name, Some(DEFAULT_ROLE))
            .map(Some)
    }
}

fn duplicate_email(err: RepositoryError) -> SessionError {
    match err {
        RepositoryError::Conflict(_) => SessionError::Validation("email already in use".to_string()),
        other => other.into(),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, SessionError> {
    bcrypt::hash(password, cost).map_err(|err| SessionError::Hashing(err.to_string()))
}

/// Malformed stored hashes count as a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// Error raised by the admin session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("operator not found: {0}")]
    UnknownOperator(i64),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip_and_rejection() {
        let stored = hash_password("s3cret!", 4).expect("hash");
        assert!(stored.starts_with("$2b$04$"));
        assert!(verify_password("s3cret!", &stored));
        assert!(!verify_password("S3cret!", &stored));
        assert!(!verify_password("s3cret!", "not-a-hash"));
        assert_ne!(
            stored,
            hash_password("s3cret!", 4).expect("hash"),
            "salt differs per hash"
        );
    }

    #[test]
    fn default_policy_uses_production_cost() {
        assert_eq!(SessionPolicy::default().password_cost, 12);
        assert!(matches!(
            hash_password("s3cret!", 2),
            Err(SessionError::Hashing(_))
        ));
    }

    #[test]
    fn tokens_are_hex_of_expected_length() {
        let token = random_hex(TOKEN_BYTES);
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

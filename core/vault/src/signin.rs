//! Sign-in handling with lockout accounting.
//!
//! `SignInHandler` is transport-agnostic: web sessions and administrative
//! tools run the exact same path, so lockout and audit records cannot be
//! bypassed by choosing a different front end.
//!
//! Every attempt writes exactly one history record, except attempts that
//! fail input validation before any lookup (caller errors, not security
//! events). History writes are best-effort and never mask the primary
//! result.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::security::SecurityService;
use strongroom_common::{Error, Result, SensitiveString};
use strongroom_storage::{
    ClientInfo, SignInHistoryItem, SignInHistoryRepository, User, UserRepository,
};

/// Denial reason recorded for bad credentials; also used for nonexistent
/// usernames so history never distinguishes the two.
const REASON_INVALID_CREDENTIALS: &str = "Invalid credentials";
const REASON_LOCKED: &str = "Account is locked";
const REASON_INACTIVE: &str = "Account is inactive";
const REASON_MEK_UNAVAILABLE: &str = "Master key could not be recovered";

/// Failed-attempt lockout policy.
#[derive(Debug, Clone)]
pub struct SignInPolicy {
    /// Failed attempts within the window that trigger a lock.
    pub max_attempts: u32,
    /// Trailing window over which failures are counted.
    pub attempt_window: Duration,
}

impl Default for SignInPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_window: Duration::minutes(30),
        }
    }
}

/// One sign-in attempt as supplied by a transport front end.
#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub username: String,
    pub password: SensitiveString,
}

impl SignInRequest {
    pub fn new(username: impl Into<String>, password: impl Into<SensitiveString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Outcome of a successful sign-in: the account plus its unwrapped master
/// key, handed to the caller for session caching.
#[derive(Debug)]
pub struct SignInSuccess {
    pub user: User,
    pub mek: strongroom_crypto::MasterKey,
}

/// Authentication state machine.
pub struct SignInHandler {
    users: Arc<dyn UserRepository>,
    history: Arc<dyn SignInHistoryRepository>,
    security: Arc<SecurityService>,
    policy: SignInPolicy,
}

impl SignInHandler {
    /// Create a handler over the given collaborators.
    pub fn new(
        users: Arc<dyn UserRepository>,
        history: Arc<dyn SignInHistoryRepository>,
        security: Arc<SecurityService>,
        policy: SignInPolicy,
    ) -> Self {
        Self {
            users,
            history,
            security,
            policy,
        }
    }

    /// Run one sign-in attempt through the full state machine.
    ///
    /// # Postconditions
    /// - Exactly one history record is written, unless input validation
    ///   failed before the username lookup
    /// - On success the returned MEK is the only plaintext copy
    ///
    /// # Errors
    /// - `InvalidInput` on empty username or password (no history record)
    /// - `Unauthorized` on unknown username or wrong password; the message
    ///   never reveals which
    /// - `Forbidden` on locked or inactive accounts, or when this attempt
    ///   tripped the lockout threshold
    /// - `Internal` when the envelope cannot be opened after the password
    ///   verified (corrupted security material)
    pub async fn handle_sign_in(
        &self,
        request: &SignInRequest,
        client: &ClientInfo,
    ) -> Result<SignInSuccess> {
        let username = request.username.trim();
        if username.is_empty() || request.password.is_empty() {
            return Err(Error::InvalidInput(
                "Username and password are required".to_string(),
            ));
        }

        let Some(user) = self.users.find_by_username(username).await? else {
            self.record(None, username, client, false, Some(REASON_INVALID_CREDENTIALS))
                .await;
            return Err(Error::Unauthorized("Invalid credentials".to_string()));
        };

        if user.is_locked {
            self.record(
                Some(&user),
                username,
                client,
                false,
                Some(REASON_LOCKED),
            )
            .await;
            return Err(Error::Forbidden("Account is locked.".to_string()));
        }

        if !user.is_active {
            self.record(
                Some(&user),
                username,
                client,
                false,
                Some(REASON_INACTIVE),
            )
            .await;
            return Err(Error::Forbidden("Account is inactive.".to_string()));
        }

        if !self
            .security
            .verify_password(&user, request.password.as_str())?
        {
            self.record(
                Some(&user),
                username,
                client,
                false,
                Some(REASON_INVALID_CREDENTIALS),
            )
            .await;
            return self.account_for_failed_attempt(user, username).await;
        }

        // Password verified; any trouble from here on is corruption, not
        // a credentials problem.
        match self.security.uncover_mek(&user, request.password.as_str()) {
            Ok(Some(mek)) => {
                self.record(Some(&user), username, client, true, None).await;
                info!(username = %username, "Sign-in succeeded");
                Ok(SignInSuccess { user, mek })
            }
            Ok(None) => {
                self.record(
                    Some(&user),
                    username,
                    client,
                    false,
                    Some(REASON_MEK_UNAVAILABLE),
                )
                .await;
                error!(username = %username, "Master key uncover returned empty after verified password");
                Err(Error::Internal(
                    "Master key could not be recovered".to_string(),
                ))
            }
            Err(e) => {
                self.record(
                    Some(&user),
                    username,
                    client,
                    false,
                    Some(REASON_MEK_UNAVAILABLE),
                )
                .await;
                error!(username = %username, error = %e, "Master key envelope failed to open");
                Err(Error::Internal(
                    "Master key could not be recovered".to_string(),
                ))
            }
        }
    }

    /// Count recent failures and lock the account once the threshold is
    /// reached.
    ///
    /// The count is a plain time-window query with no serialization against
    /// concurrent attempts, so under concurrent attack the lock may land a
    /// few attempts late ("eventually locked").
    async fn account_for_failed_attempt(
        &self,
        mut user: User,
        username: &str,
    ) -> Result<SignInSuccess> {
        let failures = self
            .history
            .recent_failures(username, self.policy.attempt_window)
            .await?;

        if failures.len() as u32 >= self.policy.max_attempts {
            if let Err(e) = self.security.lock_user(&mut user).await {
                warn!(username = %username, error = %e, "Failed to persist lockout");
            }
            warn!(
                username = %username,
                attempts = failures.len(),
                "Lockout threshold reached"
            );
            return Err(Error::Forbidden(
                "Account locked after too many failed sign-in attempts.".to_string(),
            ));
        }

        Err(Error::Unauthorized("Invalid credentials".to_string()))
    }

    /// Append one history record; failures are logged and swallowed so the
    /// primary result is never masked.
    async fn record(
        &self,
        user: Option<&User>,
        username: &str,
        client: &ClientInfo,
        success: bool,
        failure_reason: Option<&str>,
    ) {
        let item = SignInHistoryItem {
            id: Uuid::new_v4().to_string(),
            user_id: user.map(|u| u.id.clone()),
            username: username.to_string(),
            timestamp: Utc::now(),
            client: client.clone(),
            success,
            failure_reason: failure_reason.map(String::from),
        };

        if let Err(e) = self.history.add(item).await {
            warn!(username = %username, error = %e, "Failed to write sign-in history record");
        }
    }
}

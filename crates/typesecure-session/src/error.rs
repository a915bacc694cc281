//! Error types for the session layer.
//!
//! Provider failures come in as free-form text. At the session manager
//! boundary they are re-classified into [`AuthError`], a small stable
//! set of kinds the UI can react to. Raw provider text is kept on the
//! error for logs, but the message shown to users always comes from
//! [`AuthError::user_message`].

use std::fmt;

use crate::ProviderError;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The login gate is closed; try again after the cooldown.
    #[error("too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The provider rejected the email/password combination.
    /// Carries the provider's message for the caller.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Credentials are valid but the email was never verified, and the
    /// session policy requires verification.
    #[error("account email is not verified")]
    UnverifiedAccount,

    /// The email is already registered.
    #[error("an account with this email already exists")]
    DuplicateAccount,

    /// The password is shorter than the configured minimum.
    /// Raised before any network call.
    #[error("password must be at least {min_len} characters")]
    WeakSecret { min_len: usize },

    /// The provider refused the email address as malformed.
    #[error("malformed email address: {0}")]
    MalformedAddress(String),

    /// A required field was empty. Raised before any network call.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Network failure or timeout talking to the identity provider.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered with something we don't recognize.
    #[error("unrecognized provider error: {0}")]
    Unknown(String),
}

/// Fieldless discriminant of [`AuthError`], for matching and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    InvalidCredentials,
    UnverifiedAccount,
    DuplicateAccount,
    WeakSecret,
    MalformedAddress,
    MissingField,
    ProviderUnavailable,
    Unknown,
}

impl AuthError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            Self::UnverifiedAccount => ErrorKind::UnverifiedAccount,
            Self::DuplicateAccount => ErrorKind::DuplicateAccount,
            Self::WeakSecret { .. } => ErrorKind::WeakSecret,
            Self::MalformedAddress(_) => ErrorKind::MalformedAddress,
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// `true` for errors raised locally, before any provider call.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::WeakSecret { .. }
                | Self::RateLimited { .. }
        )
    }

    /// Canned, user-safe text for this error. Never includes provider
    /// output.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { retry_after_secs } => format!(
                "Too many attempts. Please try again in {retry_after_secs} seconds."
            ),
            Self::InvalidCredentials(_) => "Invalid email or password.".into(),
            Self::UnverifiedAccount => {
                "Please verify your email address before signing in.".into()
            }
            Self::DuplicateAccount => "This email is already registered.".into(),
            Self::WeakSecret { min_len } => {
                format!("Password must be at least {min_len} characters.")
            }
            Self::MalformedAddress(_) => "Invalid email address.".into(),
            Self::MissingField(_) => "All fields are required.".into(),
            Self::ProviderUnavailable(_) => {
                "Unable to reach the authentication service. Please try again."
                    .into()
            }
            Self::Unknown(_) => "Something went wrong. Please try again.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Which manager operation a provider call belongs to. Classification
/// depends on it: "email" in a sign-up error means a bad address, while
/// in a sign-in error it doesn't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Restore,
    Login,
    Register,
    Logout,
    PasswordReset,
}

impl Operation {
    /// Title of the notice shown when this operation fails.
    pub(crate) fn failure_title(self) -> &'static str {
        match self {
            Self::Restore => "Session restore failed",
            Self::Login => "Login failed",
            Self::Register => "Registration failed",
            Self::Logout => "Logout failed",
            Self::PasswordReset => "Password reset failed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Restore => "restore",
            Self::Login => "login",
            Self::Register => "register",
            Self::Logout => "logout",
            Self::PasswordReset => "password_reset",
        };
        f.write_str(name)
    }
}

/// Maps a provider failure onto the [`AuthError`] taxonomy.
///
/// Matching is case-insensitive on the provider's message, with the
/// HTTP status as a secondary signal. `fallback_retry_secs` is used when
/// the provider rate-limits us without saying for how long.
pub(crate) fn classify(
    error: ProviderError,
    op: Operation,
    fallback_retry_secs: u64,
) -> AuthError {
    let (status, message, retry_after) = match error {
        ProviderError::Transport(detail) => {
            return AuthError::ProviderUnavailable(detail);
        }
        ProviderError::Rejected {
            status,
            message,
            retry_after_secs,
        } => (status, message, retry_after_secs),
    };
    let lower = message.to_lowercase();

    if lower.contains("rate limit")
        || lower.contains("too many requests")
        || status == Some(429)
    {
        return AuthError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(fallback_retry_secs),
        };
    }
    if lower.contains("already registered") || lower.contains("already exists") {
        return AuthError::DuplicateAccount;
    }
    if lower.contains("email not confirmed") {
        return AuthError::UnverifiedAccount;
    }
    if lower.contains("invalid login credentials")
        || lower.contains("invalid credentials")
    {
        return AuthError::InvalidCredentials(message);
    }
    if matches!(op, Operation::Register | Operation::PasswordReset)
        && lower.contains("email")
    {
        return AuthError::MalformedAddress(message);
    }
    if matches!(status, Some(502..=504)) {
        return AuthError::ProviderUnavailable(message);
    }
    if op == Operation::Login && matches!(status, Some(400 | 401)) {
        return AuthError::InvalidCredentials(message);
    }
    AuthError::Unknown(message)
}

//! Explicit session context shared by the gateway and auth calls.
//!
//! A [`Session`] holds the current [`Credentials`] behind an `ArcSwapOption`,
//! so every API call reads the token at call time without locking and a
//! login or logout is a single atomic swap. The access token's `exp` claim is
//! decoded client-side (the signature is not verified; the server does that).
//! A token within `expiry_skew` of expiring is treated as expired: the
//! session is cleared before the call and the call fails with
//! [`SessionError::Expired`].

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Default margin before `exp` at which a token is considered expired.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No authentication token found.")]
    NotAuthenticated,
    #[error("session expired")]
    Expired,
    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session file: {0}")]
    Format(#[from] serde_json::Error),
}

// ---- Clock ----

/// Source of wall-clock time, replaceable in tests.
pub trait ClockSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

// ---- Credentials ----

/// Claims read from the access token. Unknown claims land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decodes the claims of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns [`SessionError::InvalidToken`] if the token is not a well-formed
/// JWT with a JSON claims object.
pub fn decode_claims(token: &str) -> Result<TokenClaims, SessionError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Tokens plus the claims decoded from the access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    access: String,
    refresh: Option<String>,
    claims: TokenClaims,
}

/// On-disk remember-me format.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidToken`] if `access` cannot be decoded.
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Result<Self, SessionError> {
        let access = access.into();
        let claims = decode_claims(&access)?;
        Ok(Self {
            access,
            refresh,
            claims,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_deref()
    }

    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Expiry in milliseconds since the epoch; `None` if the token has no
    /// `exp` claim.
    #[must_use]
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.claims.exp.map(|secs| secs.saturating_mul(1000))
    }

    /// True once `now_ms + skew` reaches the expiry. Tokens without `exp`
    /// never expire client-side.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64, skew: Duration) -> bool {
        let skew_ms = u64::try_from(skew.as_millis()).unwrap_or(u64::MAX);
        self.expires_at_ms()
            .is_some_and(|exp| now_ms.saturating_add(skew_ms) >= exp)
    }
}

// ---- Session ----

/// Shared handle to the signed-in user's credentials.
pub struct Session {
    current: ArcSwapOption<Credentials>,
    clock: Box<dyn ClockSource>,
    expiry_skew: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.current.load().is_some())
            .field("expiry_skew", &self.expiry_skew)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a signed-out session on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock), DEFAULT_EXPIRY_SKEW)
    }

    #[must_use]
    pub fn with_clock(clock: Box<dyn ClockSource>, expiry_skew: Duration) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            clock,
            expiry_skew,
        }
    }

    #[must_use]
    pub fn expiry_skew(&self) -> Duration {
        self.expiry_skew
    }

    /// Installs credentials, replacing any previous ones.
    pub fn install(&self, credentials: Credentials) -> Arc<Credentials> {
        let credentials = Arc::new(credentials);
        self.current.store(Some(Arc::clone(&credentials)));
        debug!(user = ?credentials.claims().user_id, "session installed");
        credentials
    }

    /// Signs out locally and returns what was installed.
    pub fn clear(&self) -> Option<Arc<Credentials>> {
        self.current.swap(None)
    }

    /// Installed credentials without an expiry check.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Credentials>> {
        self.current.load_full()
    }

    /// Credentials valid for a call right now.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] when signed out, or
    /// [`SessionError::Expired`] after clearing a session whose token is
    /// within the expiry skew.
    pub fn active(&self) -> Result<Arc<Credentials>, SessionError> {
        let credentials = self.current().ok_or(SessionError::NotAuthenticated)?;
        if credentials.is_expired_at(self.clock.now(), self.expiry_skew) {
            self.clear();
            warn!("access token expired; session cleared");
            return Err(SessionError::Expired);
        }
        Ok(credentials)
    }

    /// Bearer token for the next call.
    ///
    /// # Errors
    ///
    /// See [`Session::active`].
    pub fn bearer_token(&self) -> Result<String, SessionError> {
        self.active().map(|c| c.access_token().to_string())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.active().is_ok()
    }

    // ---- Remember-me ----

    /// Writes the installed tokens to `path` (mode 0600 on Unix).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] when signed out, or
    /// [`SessionError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let credentials = self.current().ok_or(SessionError::NotAuthenticated)?;
        let stored = StoredTokens {
            access: credentials.access_token().to_string(),
            refresh: credentials.refresh_token().map(str::to_string),
        };
        let json = serde_json::to_vec_pretty(&stored)?;
        let io_err = |source| SessionError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        info!(path = %path.display(), "session remembered");
        Ok(())
    }

    /// Restores tokens saved by [`Session::save`]. Returns `false` when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] on read failure, [`SessionError::Format`]
    /// for a malformed file, or [`SessionError::InvalidToken`] if the saved
    /// access token cannot be decoded.
    pub fn load(&self, path: &Path) -> Result<bool, SessionError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(SessionError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let stored: StoredTokens = serde_json::from_slice(&bytes)?;
        self.install(Credentials::new(stored.access, stored.refresh)?);
        debug!(path = %path.display(), "session restored");
        Ok(true)
    }

    /// Deletes a remember-me file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file exists but cannot be removed.
    pub fn forget(path: &Path) -> Result<(), SessionError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

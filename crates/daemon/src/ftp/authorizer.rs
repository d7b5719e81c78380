//! Virtual user table consulted by the transfer engine at login.
//!
//! Permission letters:
//! - read: `e` change directory, `l` list, `r` retrieve
//! - write: `a` append, `d` delete, `f` rename, `m` make directory,
//!   `w` store, `M` change mode

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::UserConfig;

/// Name of the anonymous account.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Read-only permissions granted to anonymous users.
pub const ANONYMOUS_PERM: &str = "elr";

/// Permissions given to configured users that do not set their own.
pub const DEFAULT_USER_PERM: &str = "elradfmw";

const READ_PERMS: &str = "elr";
const WRITE_PERMS: &str = "adfmwM";

/// Errors raised while building or consulting the user table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("user {0:?} already exists")]
    DuplicateUser(String),

    #[error("no such permission {0:?}")]
    InvalidPermission(char),

    #[error("Authentication failed.")]
    AuthenticationFailed,

    #[error("Anonymous access not allowed.")]
    AnonymousNotAllowed,
}

/// Returns the first letter of `perm` that is not a known permission.
pub fn invalid_perm_letter(perm: &str) -> Option<char> {
    perm.chars()
        .find(|c| !READ_PERMS.contains(*c) && !WRITE_PERMS.contains(*c))
}

/// Hex-encoded SHA-256 digest of `password`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone)]
struct UserEntry {
    password_sha256: String,
    home: PathBuf,
    perm: String,
}

/// Table of users allowed to log in to the transfer engine.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    users: HashMap<String, UserEntry>,
}

impl Authorizer {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from configured accounts, all homed at `home`.
    pub fn from_config(users: &[UserConfig], anonymous: bool, home: &Path) -> Result<Self, AuthError> {
        let mut authorizer = Self::new();
        if anonymous {
            authorizer.add_anonymous(home)?;
        }
        for user in users {
            authorizer.add_user(&user.username, &user.password_sha256, home, &user.perm)?;
        }
        Ok(authorizer)
    }

    /// Add a user with a hex SHA-256 password digest.
    pub fn add_user(
        &mut self,
        username: &str,
        password_sha256: &str,
        home: &Path,
        perm: &str,
    ) -> Result<(), AuthError> {
        if self.users.contains_key(username) {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }
        if let Some(letter) = invalid_perm_letter(perm) {
            return Err(AuthError::InvalidPermission(letter));
        }
        if username == ANONYMOUS_USER && perm.chars().any(|c| WRITE_PERMS.contains(c)) {
            tracing::warn!("Write permissions granted to anonymous user: {}", perm);
        }

        self.users.insert(
            username.to_string(),
            UserEntry {
                password_sha256: password_sha256.to_ascii_lowercase(),
                home: home.to_path_buf(),
                perm: perm.to_string(),
            },
        );
        Ok(())
    }

    /// Add the read-only anonymous account.
    pub fn add_anonymous(&mut self, home: &Path) -> Result<(), AuthError> {
        self.add_user(ANONYMOUS_USER, "", home, ANONYMOUS_PERM)
    }

    /// Whether `username` is in the table.
    pub fn has_user(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Check the supplied credentials.
    ///
    /// The anonymous account accepts any password.
    pub fn validate_authentication(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let Some(user) = self.users.get(username) else {
            if username == ANONYMOUS_USER {
                return Err(AuthError::AnonymousNotAllowed);
            }
            return Err(AuthError::AuthenticationFailed);
        };

        if username != ANONYMOUS_USER && hash_password(password) != user.password_sha256 {
            return Err(AuthError::AuthenticationFailed);
        }
        Ok(())
    }

    /// Whether `username` holds permission letter `perm`.
    pub fn has_perm(&self, username: &str, perm: char) -> bool {
        self.users
            .get(username)
            .is_some_and(|user| user.perm.contains(perm))
    }

    /// Home directory of `username`.
    pub fn home(&self, username: &str) -> Option<&Path> {
        self.users.get(username).map(|user| user.home.as_path())
    }
}

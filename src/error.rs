//! Error types shared across the vault, session cache and SSH bridge.

use std::io;

use thiserror::Error;

/// Failures of the authenticated-encryption layer.
///
/// A wrong password and a tampered ciphertext both surface as
/// [`CipherError::AuthenticationFailure`].
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("invalid encrypted data")]
    MalformedInput,

    #[error("authentication failed - wrong password or corrupted data")]
    AuthenticationFailure,

    #[error("cryptographic backend unavailable")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("store already exists")]
    AlreadyExists,

    #[error("store not initialized - run 'gate init' first")]
    NotInitialized,

    #[error("label not found: {0}")]
    NotFound(String),

    #[error("label already exists: {0}")]
    DuplicateLabel(String),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("vault I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("vault contents unreadable: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// True when the password was rejected (or the data tampered with).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Cipher(CipherError::AuthenticationFailure))
    }
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("stdin is not a terminal")]
    NotATerminal,

    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while obtaining a verified master password.
#[derive(Error, Debug)]
pub enum UnlockError {
    #[error("maximum retry attempts exceeded")]
    RetryExhausted,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("SSH connection failed: {0}")]
    ConnectionFailed(String),

    #[error("SSH authentication failed: {0}")]
    AuthFailed(String),

    #[error("remote exited with status {0}")]
    RemoteExitStatus(i32),

    #[error("session error: {0}")]
    SessionError(String),

    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

impl BridgeError {
    /// Process exit code mirroring the remote one, if this error carries it.
    pub fn exit_code(&self) -> Option<u8> {
        match self {
            Self::RemoteExitStatus(code) => Some(u8::try_from(*code).unwrap_or(1)),
            _ => None,
        }
    }
}

impl From<ssh2::Error> for BridgeError {
    fn from(err: ssh2::Error) -> Self {
        Self::SessionError(err.message().to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the home directory; set GATE_VAULT")]
    NoHomeDir,
}

pub type VaultResult<T> = Result<T, VaultError>;
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_exit_status_mirrors_code() {
        assert_eq!(BridgeError::RemoteExitStatus(3).exit_code(), Some(3));
        assert_eq!(BridgeError::RemoteExitStatus(255).exit_code(), Some(255));
        assert_eq!(BridgeError::RemoteExitStatus(-1).exit_code(), Some(1));
        assert_eq!(BridgeError::SessionError("x".into()).exit_code(), None);
    }

    #[test]
    fn authentication_failure_is_detected_through_vault_error() {
        let err = VaultError::from(CipherError::AuthenticationFailure);
        assert!(err.is_authentication_failure());
        assert!(!VaultError::from(CipherError::MalformedInput).is_authentication_failure());
        assert!(!VaultError::NotInitialized.is_authentication_failure());
    }
}

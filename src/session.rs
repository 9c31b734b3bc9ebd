//! Short-lived in-memory cache of the verified master password.
//!
//! Expiry is wall-clock based: the window starts when the password is
//! verified and is not extended by use.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::UnlockError;
use crate::prompt::SecretPrompt;
use crate::vault::VaultHandle;

pub const SESSION_TTL_MINUTES: i64 = 5;
pub const MAX_ATTEMPTS: usize = 3;

const MASTER_PROMPT: &str = "Enter master password: ";

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct SessionCache<C: Clock = SystemClock> {
    password: Option<Zeroizing<String>>,
    expires_at: DateTime<Utc>,
    ttl: Duration,
    clock: C,
}

impl SessionCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SessionCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SessionCache<C> {
    pub fn with_clock(clock: C) -> Self {
        let now = clock.now();
        Self {
            password: None,
            expires_at: now,
            ttl: Duration::minutes(SESSION_TTL_MINUTES),
            clock,
        }
    }

    /// True while a password is cached and `now <= expires_at`.
    pub fn is_active(&self) -> bool {
        self.password.is_some() && self.clock.now() <= self.expires_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.password.as_ref().map(|_| self.expires_at)
    }

    /// Caches `password` and restarts the expiry window.
    pub fn create(&mut self, password: Zeroizing<String>) {
        self.expires_at = self.clock.now() + self.ttl;
        self.password = Some(password);
        debug!(expires_at = %self.expires_at, "session created");
    }

    pub fn clear(&mut self) {
        self.password = None;
    }

    /// Returns the cached master password, prompting and verifying against
    /// `vault` when the cache is empty or expired.
    ///
    /// Only a rejected password consumes one of the [`MAX_ATTEMPTS`]; any other
    /// failure aborts immediately.
    pub fn require(
        &mut self,
        vault: &VaultHandle,
        prompt: &mut dyn SecretPrompt,
    ) -> Result<Zeroizing<String>, UnlockError> {
        if let Some(password) = self.password.as_ref() {
            if self.clock.now() <= self.expires_at {
                return Ok(password.clone());
            }
            debug!("session expired");
            self.clear();
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = prompt.read_secret(MASTER_PROMPT)?;
            match vault.verify(&candidate) {
                Ok(()) => {
                    self.create(candidate.clone());
                    return Ok(candidate);
                }
                Err(err) if err.is_authentication_failure() => {
                    warn!(attempt, "master password rejected");
                    prompt.notify("Wrong password. Try again.");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(UnlockError::RetryExhausted)
    }
}

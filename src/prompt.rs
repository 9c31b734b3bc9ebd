use std::io;

use crossterm::tty::IsTty;
use zeroize::{Zeroize, Zeroizing};

use crate::error::PromptError;

/// Source of secrets typed by the user.
pub trait SecretPrompt {
    /// Reads one secret, without echo, trimmed of surrounding whitespace.
    fn read_secret(&mut self, message: &str) -> Result<Zeroizing<String>, PromptError>;

    /// Tells the user something went wrong between attempts.
    fn notify(&mut self, message: &str);
}

/// Reads secrets from the controlling terminal. Refuses to run when stdin
/// is piped or redirected.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn read_secret(&mut self, message: &str) -> Result<Zeroizing<String>, PromptError> {
        if !io::stdin().is_tty() {
            return Err(PromptError::NotATerminal);
        }
        let mut raw = rpassword::prompt_password(message)?;
        let secret = Zeroizing::new(raw.trim().to_string());
        raw.zeroize();
        Ok(secret)
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Asks for a secret twice and insists both match and are non-empty.
pub fn read_confirmed_secret(
    prompt: &mut dyn SecretPrompt,
    message: &str,
    confirm: &str,
) -> anyhow::Result<Zeroizing<String>> {
    let first = prompt.read_secret(message)?;
    if first.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let second = prompt.read_secret(confirm)?;
    if *first != *second {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

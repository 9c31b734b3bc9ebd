use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::Text;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::debug;
use crate::models::{parse_port, Entry};
use crate::prompt::{read_confirmed_secret, SecretPrompt, TerminalPrompt};
use crate::session::SessionCache;
use crate::ssh::{self, SessionOutcome};
use crate::vault::VaultHandle;

#[derive(Parser)]
#[command(name = "gate")]
#[command(about = "gate - The gatekeeper to your SSH access")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize gate with a master password
    Init,

    /// Add a new SSH label
    New,

    /// List all SSH labels
    List,

    /// Connect to a saved SSH label
    Connect {
        /// Label of the saved entry
        label: String,
    },

    /// Delete an SSH label
    Delete {
        /// Label of the saved entry
        label: String,
    },

    /// Rotate the master password
    Rotate,

    /// Import SSH entries from another gate store file
    Import {
        /// Path to the encrypted store to merge in
        file: PathBuf,
    },

    /// Show vault diagnostics
    Debug,
}

/// What the process should do after a command succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// The interactive session was ended by a local signal.
    Interrupted(ssh::LocalSignal),
}

/// Owns the vault handle and session cache for the lifetime of the process.
pub struct CliHandler {
    settings: Settings,
    vault: VaultHandle,
    session: SessionCache,
    prompt: TerminalPrompt,
}

impl CliHandler {
    pub fn new(settings: Settings) -> Self {
        let vault = VaultHandle::new(settings.vault_path.clone());
        Self {
            settings,
            vault,
            session: SessionCache::new(),
            prompt: TerminalPrompt,
        }
    }

    pub async fn run(&mut self, cli: Cli) -> Result<Completion> {
        match cli.command {
            Commands::Init => self.handle_init()?,
            Commands::New => self.handle_new()?,
            Commands::List => self.handle_list()?,
            Commands::Connect { label } => return self.handle_connect(&label).await,
            Commands::Delete { label } => self.handle_delete(&label)?,
            Commands::Rotate => self.handle_rotate()?,
            Commands::Import { file } => self.handle_import(file)?,
            Commands::Debug => println!("{}", debug::inspect(self.vault.path())),
        }

        Ok(Completion::Done)
    }

    fn handle_init(&mut self) -> Result<()> {
        if self.vault.exists() {
            anyhow::bail!("Initialization failed: store already exists");
        }

        let password = read_confirmed_secret(
            &mut self.prompt,
            "Enter master password: ",
            "Confirm master password: ",
        )?;

        self.vault
            .init(&password)
            .context("Initialization failed")?;
        self.session.create(password);
        println!("gate initialized.");

        Ok(())
    }

    fn handle_new(&mut self) -> Result<()> {
        let master = self.unlock()?;

        let label = Text::new("Label:").prompt()?;
        let user = Text::new("User:").prompt()?;
        let host = Text::new("Host:").prompt()?;
        let port = parse_port(&Text::new("Port:").with_default("22").prompt()?)?;
        let password = self.prompt.read_secret("Password: ")?;

        let entry = Entry::new(
            label.trim().to_string(),
            user.trim().to_string(),
            host.trim().to_string(),
            port,
            password.as_str().to_owned(),
        );

        self.vault.add(&master, entry)?;
        println!("Label added.");

        Ok(())
    }

    fn handle_list(&mut self) -> Result<()> {
        let master = self.unlock()?;

        let entries = self
            .vault
            .list(&master)
            .context("Error listing entries")?;

        println!("List gate({}):", entries.len());
        for entry in &entries {
            println!(
                "[{}] {} ({})",
                entry.label,
                entry.destination(),
                entry.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        Ok(())
    }

    async fn handle_connect(&mut self, label: &str) -> Result<Completion> {
        let master = self.unlock()?;

        let entry = self
            .vault
            .get(&master, label)
            .context("failed to get entry")?;
        drop(master);

        println!("Connecting to {}...", entry.destination());
        match ssh::connect(&entry, &self.settings.term).await? {
            SessionOutcome::Exited => Ok(Completion::Done),
            SessionOutcome::Terminated(signal) => Ok(Completion::Interrupted(signal)),
        }
    }

    fn handle_delete(&mut self, label: &str) -> Result<()> {
        let master = self.unlock()?;

        self.vault
            .delete(&master, label)
            .context("Error deleting")?;
        println!("Label deleted.");

        Ok(())
    }

    fn handle_rotate(&mut self) -> Result<()> {
        let old = self.prompt.read_secret("Enter old master password: ")?;
        let new = read_confirmed_secret(
            &mut self.prompt,
            "Enter new master password: ",
            "Confirm new master password: ",
        )?;

        self.vault
            .rotate_master_password(&old, &new)
            .context("Rotation failed")?;
        self.session.create(new);
        println!("Master password rotated.");

        Ok(())
    }

    fn handle_import(&mut self, file: PathBuf) -> Result<()> {
        let master = self.unlock()?;
        let import_password = self.prompt.read_secret("Enter import passphrase: ")?;

        let merged = self
            .vault
            .import_file(&master, &import_password, &file)
            .with_context(|| format!("Import failed: {}", file.display()))?;
        println!("Import complete. {} entries merged.", merged);

        Ok(())
    }

    fn unlock(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.session.require(&self.vault, &mut self.prompt)?)
    }
}

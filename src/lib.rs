pub mod cli;
pub mod config;
pub mod crypto;
pub mod debug;
pub mod error;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod session;
pub mod ssh;
pub mod vault;

// Re-export commonly used types for tests and external use
pub use error::{BridgeError, CipherError, PromptError, UnlockError, VaultError};
pub use models::{Entry, VaultSnapshot};
pub use session::SessionCache;
pub use vault::VaultHandle;

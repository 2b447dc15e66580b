/// Command-line and environment configuration.
///
/// Every option can also be supplied through the environment (a `.env` file
/// in the working directory is loaded first).
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use playon_shared::api_protocol::DEFAULT_API_BASE;
use playon_shared::errors::PlayOnError;

use crate::transfer::DEFAULT_EXTENSION;

/// Mirror a PlayOn Cloud recording library to local disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "playon-dl", version, about)]
pub struct Cli {
    /// PlayOn account e-mail.
    #[arg(long, env = "PLAYON_USERNAME")]
    pub username: Option<String>,

    /// PlayOn account password.
    #[arg(long, env = "PLAYON_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path of the SQLite ledger of already-downloaded recordings.
    #[arg(
        long,
        value_name = "FILE",
        env = "PLAYON_DATABASE_PATH",
        default_value = "./playondb.sqlite"
    )]
    pub database: PathBuf,

    /// Directory downloaded recordings are written to.
    #[arg(short, long, value_name = "DIR", env = "PLAYON_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// File extension given to downloaded recordings.
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,

    /// API root of the recording service.
    #[arg(long, env = "PLAYON_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Timeout for each JSON API request, in seconds.
    #[arg(long, env = "PLAYON_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout: u64,

    /// Timeout for establishing any connection, in seconds.
    #[arg(long, env = "PLAYON_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// List what would be downloaded without downloading anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Keep going after a recording fails instead of aborting the pass.
    /// The process still exits non-zero if anything failed.
    #[arg(long, default_value_t = false)]
    pub keep_going: bool,

    /// Print the recordings already in the ledger and exit.
    #[arg(long, default_value_t = false)]
    pub list_ledger: bool,
}

/// Account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for the remote library client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Cli {
    /// Credentials for the sync pass. Both values must be present and non-empty.
    pub fn credentials(&self) -> Result<Credentials, PlayOnError> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                PlayOnError::Config("PLAYON_USERNAME or --username must be set".to_string())
            })?;
        let password = self
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                PlayOnError::Config("PLAYON_PASSWORD or --password must be set".to_string())
            })?;

        Ok(Credentials { username, password })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base: self.api_base.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}

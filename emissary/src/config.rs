//! Configuration loading and validation.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use emissary_delivery::{Mailer, MaildirMailer, SendmailMailer};
use ron::extensions::Extensions;
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "EMISSARY_CONFIG";

/// Searched in order when neither `--config` nor [`CONFIG_ENV`] is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./emissary.config.ron",
    "/etc/emissary/emissary.config.ron",
];

const SYSTEM_DIRECTORIES: [&str; 9] = [
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Queue path cannot contain '..' components: {}", .0.display())]
    ParentDirectory(PathBuf),

    #[error("Queue path must be absolute: {}", .0.display())]
    Relative(PathBuf),

    #[error("Queue path cannot be in system directory {prefix}: {}", .path.display())]
    SystemDirectory { prefix: &'static str, path: PathBuf },

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("EMISSARY_CONFIG points to non-existent file: {}", .0.display())]
    MissingFromEnv(PathBuf),

    #[error("Configuration file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("No configuration file found. Tried:\n  - EMISSARY_CONFIG environment variable\n{0}")]
    NotFound(String),
}

/// Parse RON with the extensions configuration files rely on.
///
/// `unwrap_variant_newtypes` lets a mailer be written `Sendmail(command: ..)`
/// rather than `Sendmail((command: ..))`.
///
/// # Errors
/// If `content` is not valid RON for `T`
pub fn from_ron<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    Ok(ron::Options::default()
        .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES | Extensions::IMPLICIT_SOME)
        .from_str(content)?)
}

/// Locate the configuration file.
///
/// Precedence: `explicit` (the `--config` flag), then `from_env`
/// ([`CONFIG_ENV`]), then [`DEFAULT_CONFIG_PATHS`].
///
/// # Errors
/// If the chosen file does not exist, or none of the defaults do
pub fn find_config_file(
    explicit: Option<PathBuf>,
    from_env: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::Missing(path))
        };
    }

    if let Some(path) = from_env {
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::MissingFromEnv(path))
        };
    }

    if let Some(path) = DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    Err(ConfigError::NotFound(
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(|path| format!("  - {path}"))
            .collect::<Vec<_>>()
            .join("\n"),
    ))
}

/// Where queued messages live
///
/// ```ron
/// queue: (
///     path: "/var/spool/emissary",
///     create: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    path: PathBuf,
    create: bool,
}

impl<'de> Deserialize<'de> for QueueConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        const fn default_create() -> bool {
            true
        }

        #[derive(Deserialize)]
        struct QueueConfigHelper {
            path: PathBuf,
            #[serde(default = "default_create")]
            create: bool,
        }

        let helper = QueueConfigHelper::deserialize(deserializer)?;
        Self::new(helper.path, helper.create).map_err(serde::de::Error::custom)
    }
}

impl QueueConfig {
    /// # Errors
    /// If `path` fails [`validate_path`](Self::validate_path)
    pub fn new(path: impl Into<PathBuf>, create: bool) -> Result<Self, ConfigError> {
        let path = path.into();
        Self::validate_path(&path)?;

        Ok(Self { path, create })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    /// Reject queue paths that could escape into, or clobber, the system.
    ///
    /// The path must be absolute, have no `..` components, and lie outside
    /// the system directories.
    ///
    /// # Errors
    /// The first check that fails
    pub fn validate_path(path: &Path) -> Result<(), ConfigError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(ConfigError::ParentDirectory(path.to_path_buf()));
        }

        if !path.is_absolute() {
            return Err(ConfigError::Relative(path.to_path_buf()));
        }

        if let Some(prefix) = SYSTEM_DIRECTORIES
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ConfigError::SystemDirectory {
                prefix: *prefix,
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }
}

/// The transport queued messages are finally handed to
///
/// ```ron
/// mailer: Sendmail(command: "/usr/sbin/sendmail", args: ["-i"])
/// mailer: Maildir(path: "/var/mail/outbox", create: true)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum MailerConfig {
    Sendmail(SendmailMailer),
    Maildir(MaildirMailer),
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self::Sendmail(SendmailMailer::default())
    }
}

impl MailerConfig {
    pub fn build(&self) -> Arc<dyn Mailer> {
        match self {
            Self::Sendmail(mailer) => Arc::new(mailer.clone()),
            Self::Maildir(mailer) => Arc::new(mailer.clone()),
        }
    }
}

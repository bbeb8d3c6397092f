//! Log level management.
//!
//! The level is resolved from a [`LogLevelStore`] first, then from `NILAUTH_LOG_LEVEL`, and falls
//! back to `info`. The store is how a level survives process restarts; where it lives is up to the
//! caller.

use serde::{Deserialize, Serialize};
use std::{
    env,
    fmt::{self, Display},
    fs, io,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, warn};
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

const LOG_LEVEL_ENV: &str = "NILAUTH_LOG_LEVEL";

/// A log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,

    /// Disables logging.
    Silent,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Silent => "silent",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unknown log level name.
#[derive(Debug, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "silent" | "off" => Ok(Self::Silent),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Silent => LevelFilter::OFF,
        }
    }
}

/// An error when accessing a log level store.
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    /// The store could not be read or written.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The store contains something that isn't a log level.
    #[error(transparent)]
    Corrupted(#[from] UnknownLogLevel),

    /// The subscriber could not be installed.
    #[error("installing subscriber: {0}")]
    Subscriber(String),
}

/// Persists a log level.
pub trait LogLevelStore: Send + Sync {
    fn get(&self) -> Result<Option<LogLevel>, LogStoreError>;

    fn set(&self, level: LogLevel) -> Result<(), LogStoreError>;

    fn clear(&self) -> Result<(), LogStoreError>;
}

/// A store that keeps the level in a file.
#[derive(Clone, Debug)]
pub struct FileLogLevelStore {
    path: PathBuf,
}

impl FileLogLevelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogLevelStore for FileLogLevelStore {
    fn get(&self) -> Result<Option<LogLevel>, LogStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.parse()?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, level: LogLevel) -> Result<(), LogStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, level.as_str())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), LogStoreError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// A store that only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryLogLevelStore {
    level: Mutex<Option<LogLevel>>,
}

impl LogLevelStore for MemoryLogLevelStore {
    fn get(&self) -> Result<Option<LogLevel>, LogStoreError> {
        Ok(*self.level.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn set(&self, level: LogLevel) -> Result<(), LogStoreError> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = Some(level);
        Ok(())
    }

    fn clear(&self) -> Result<(), LogStoreError> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// The logging context: resolves the active level and installs the subscriber.
#[derive(Clone)]
pub struct Log {
    store: Arc<dyn LogLevelStore>,
}

impl Log {
    pub fn new(store: Arc<dyn LogLevelStore>) -> Self {
        Self { store }
    }

    /// The active log level.
    pub fn level(&self) -> LogLevel {
        match self.store.get() {
            Ok(Some(level)) => return level,
            Ok(None) => (),
            Err(e) => warn!("Ignoring stored log level: {e}"),
        }
        env::var(LOG_LEVEL_ENV).ok().and_then(|level| level.parse().ok()).unwrap_or_default()
    }

    /// Set and persist the log level.
    pub fn set_level(&self, level: LogLevel) -> Result<(), LogStoreError> {
        debug!("Setting log level to {level}");
        self.store.set(level)
    }

    /// Forget the persisted log level.
    pub fn clear_stored_level(&self) -> Result<(), LogStoreError> {
        self.store.clear()
    }

    /// A filter that applies the active level to this crate and keeps HTTP internals quiet.
    pub fn env_filter(&self) -> EnvFilter {
        let level = LevelFilter::from(self.level());
        let mut filter = EnvFilter::builder().with_default_directive(level.into()).parse_lossy("");
        for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    /// Install a global `fmt` subscriber using [`Log::env_filter`].
    pub fn init(&self) -> Result<(), LogStoreError> {
        tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .compact()
            .try_init()
            .map_err(|e| LogStoreError::Subscriber(e.to_string()))
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log").field("level", &self.level()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LevelFilter::from(LogLevel::Silent), LevelFilter::OFF);
    }

    #[test]
    fn stored_level_wins() {
        let log = Log::new(Arc::new(MemoryLogLevelStore::default()));
        log.set_level(LogLevel::Trace).unwrap();
        assert_eq!(log.level(), LogLevel::Trace);
        log.clear_stored_level().unwrap();
        assert_eq!(log.store.get().unwrap(), None);
    }

    #[test]
    fn file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nilauth").join("log-level");

        let store = FileLogLevelStore::new(&path);
        assert_eq!(store.get().unwrap(), None);
        store.set(LogLevel::Warn).unwrap();

        // A new store over the same file sees the level, like a restarted process would.
        let log = Log::new(Arc::new(FileLogLevelStore::new(&path)));
        assert_eq!(log.level(), LogLevel::Warn);

        log.clear_stored_level().unwrap();
        assert!(!path.exists());
        log.clear_stored_level().unwrap();
    }

    #[test]
    fn corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-level");
        fs::write(&path, "very loud").unwrap();
        let store = FileLogLevelStore::new(&path);
        assert!(matches!(store.get(), Err(LogStoreError::Corrupted(_))));
    }

    #[test]
    fn filter_uses_level() {
        let log = Log::new(Arc::new(MemoryLogLevelStore::default()));
        log.set_level(LogLevel::Trace).unwrap();
        assert_eq!(log.env_filter().max_level_hint(), Some(LevelFilter::TRACE));
    }
}

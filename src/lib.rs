pub mod collections;
pub mod config;
pub mod conversation;
pub mod generation;
pub mod inference;

use std::path::{Path, PathBuf};

pub use config::{find_config_path, load_config, ClientConfig, ConfigError};
pub use conversation::{ChatDatabase, ContextEntry, ConversationLogs, Message, StopReason};
pub use generation::{
    EventReceiver, GenerationError, GenerationEvent, GenerationOrchestrator, GenerationSettings,
    TurnOutcome, TurnPhase, TurnRequest,
};

/// Log file name inside the log directory.
const LOG_FILE_NAME: &str = "duologue.log";

/// Rotated log files kept next to the live one.
const LOG_FILES_KEPT: u32 = 3;

/// Return the platform-standard data directory for Duologue.
///
/// - macOS: `~/Library/Application Support/duologue/`
/// - Windows: `{FOLDERID_RoamingAppData}\duologue\`
/// - Linux: `$XDG_DATA_HOME/duologue/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.duologue/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("duologue");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".duologue")
}

/// Path of the chat database under [`data_dir`]. Creates the directory.
pub fn default_db_path() -> std::io::Result<PathBuf> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("chat.db"))
}

/// Initialize the tracing subscriber, writing to `log_dir/duologue.log`.
///
/// On each startup:
/// 1. Rotates existing logs (duologue.log → .1 → .2 → .3).
/// 2. Opens a fresh log with a line-flushing writer.
/// 3. Logs a startup banner with the log path.
///
/// `RUST_LOG` overrides the default `duologue=info,warn` filter. Returns the
/// live log path.
pub fn init_tracing(log_dir: &Path) -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, LOG_FILES_KEPT);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("duologue=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| std::io::Error::other(format!("tracing already initialized: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== Duologue starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `duologue.log` → `duologue.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

/// Only records whose target starts with this prefix are kept.
const TARGET_PREFIX: &str = "updraft";

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub path: PathBuf,
    pub debug: bool,
    pub max_bytes: u64,
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log sink that survives the file being deleted between update checks.
struct UpdaterLogFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl UpdaterLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let handle = open_append(&path)?;
        Ok(Self {
            path,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn with_handle<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match handle.take() {
            Some(file) if self.path.exists() => handle.insert(file),
            _ => handle.insert(open_append(&self.path)?),
        };
        op(file)
    }
}

impl Write for UpdaterLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_handle(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_handle(File::flush)
    }
}

/// Shrink a log larger than `max_bytes` to its most recent `max_bytes / 2`,
/// starting at a line boundary. Returns whether the file was rewritten.
fn cap_log_size(path: &Path, max_bytes: u64) -> io::Result<bool> {
    let len = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if len <= max_bytes {
        return Ok(false);
    }

    let contents = std::fs::read(path)?;
    let budget = usize::try_from(max_bytes / 2).unwrap_or(usize::MAX);
    let tail_start = contents.len().saturating_sub(budget);
    let keep_from = contents[tail_start..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(contents.len(), |offset| tail_start + offset + 1);
    std::fs::write(path, &contents[keep_from..])?;
    Ok(true)
}

/// Install the process-wide logger for an updater run.
///
/// Failing to set up the log file is not fatal; the run proceeds with
/// whatever sinks could be opened.
pub fn init_logging(options: &LogOptions) {
    if let Err(error) = cap_log_size(&options.path, options.max_bytes) {
        eprintln!(
            "warning: could not shrink {}: {error}",
            options.path.display()
        );
    }

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str(TARGET_PREFIX)
        .build();

    let mut sinks: Vec<Box<dyn SharedLogger>> = Vec::new();
    match UpdaterLogFile::open(options.path.clone()) {
        Ok(file) => sinks.push(WriteLogger::new(LevelFilter::Debug, config.clone(), file)),
        Err(error) => eprintln!(
            "warning: logging to {} is disabled: {error}",
            options.path.display()
        ),
    }
    #[cfg(debug_assertions)]
    sinks.push(TermLogger::new(
        LevelFilter::Debug,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if !sinks.is_empty() {
        let _ = CombinedLogger::init(sinks);
    }
    set_logging_enabled(options.debug);
    log::debug!("Writing debug log to {}", options.path.display());
}

/// Debug records pass when enabled; warnings and errors always do.
pub fn set_logging_enabled(enabled: bool) {
    log::set_max_level(if enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
}

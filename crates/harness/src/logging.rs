// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Fixture run failure log
//!
//! Buffers per-statement detail in memory and writes it to a log file only
//! once the first case fails, keeping terminal output to the summary while
//! preserving the full statement trace for failed runs.

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

const MAX_BUFFER_SIZE: usize = 10_000_000; // 10MB limit

/// Default log directory, relative to the working directory
pub const DEFAULT_LOG_DIR: &str = "target/fixture-logs";

static LOGGING_STATE: OnceLock<FailureLog> = OnceLock::new();

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lines recorded before the first failure
#[derive(Default)]
struct Pending {
    lines: Vec<String>,
    bytes: usize,
}

/// Buffered failure log
///
/// `flushed` only changes while `pending` is locked, so a line is either
/// buffered before the drain or appended to the file after it.
pub struct FailureLog {
    log_dir: PathBuf,
    pending: Mutex<Pending>,
    /// Created on first flush
    log_file: Mutex<Option<BufWriter<File>>>,
    flushed: AtomicBool,
    log_path: Mutex<Option<PathBuf>>,
}

impl FailureLog {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            pending: Mutex::new(Pending::default()),
            log_file: Mutex::new(None),
            flushed: AtomicBool::new(false),
            log_path: Mutex::new(None),
        }
    }

    /// Record a line (buffered in memory until the first flush)
    pub fn record(&self, line: String) {
        let mut pending = lock(&self.pending);
        if self.flushed.load(Ordering::Acquire) {
            drop(pending);
            self.append_to_file(&line);
            return;
        }

        if pending.bytes + line.len() > MAX_BUFFER_SIZE {
            drop(pending);
            if self.flush().is_ok() {
                self.append_to_file(&line);
            }
            return;
        }
        pending.bytes += line.len();
        pending.lines.push(format_timestamped_line(&line));
    }

    /// Write the buffer to a new timestamped file; later lines go straight
    /// to that file
    pub fn flush(&self) -> std::io::Result<PathBuf> {
        let mut pending = lock(&self.pending);
        if let Some(path) = self.path() {
            return Ok(path);
        }

        create_dir_all(&self.log_dir)?;
        let log_path = self
            .log_dir
            .join(format!("fixture-fail-{}.log", format_timestamp()));
        let mut writer = BufWriter::new(File::create(&log_path)?);

        for line in pending.lines.drain(..) {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        pending.bytes = 0;

        *lock(&self.log_file) = Some(writer);
        *lock(&self.log_path) = Some(log_path.clone());
        self.flushed.store(true, Ordering::Release);
        Ok(log_path)
    }

    fn append_to_file(&self, line: &str) {
        if let Some(writer) = lock(&self.log_file).as_mut() {
            let _ = writeln!(writer, "{}", format_timestamped_line(line));
            let _ = writer.flush();
        }
    }

    /// Log file path, once created
    pub fn path(&self) -> Option<PathBuf> {
        lock(&self.log_path).clone()
    }

    /// Number of lines still held in memory
    pub fn buffered_lines(&self) -> usize {
        lock(&self.pending).lines.len()
    }
}

/// Format current time as `YYYYMMDD-HHMMSS`
fn format_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

fn format_timestamped_line(line: &str) -> String {
    format!("[{}] {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"), line)
}

/// Initialise the global failure log; later calls keep the first directory
pub fn initialize(log_dir: impl Into<PathBuf>) {
    LOGGING_STATE.get_or_init(|| FailureLog::new(log_dir));
}

/// Whether [`initialize`] has been called
pub fn is_enabled() -> bool {
    LOGGING_STATE.get().is_some()
}

/// Record a line in the global failure log
pub fn record(line: String) {
    if let Some(state) = LOGGING_STATE.get() {
        state.record(line);
    }
}

/// Flush the global failure log to disk
pub fn flush_to_file() -> anyhow::Result<Option<PathBuf>> {
    match LOGGING_STATE.get() {
        Some(state) => state
            .flush()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Failed to flush fixture log to file: {}", e)),
        None => Ok(None),
    }
}

/// Global log file path, once created
pub fn log_path() -> Option<PathBuf> {
    LOGGING_STATE.get()?.path()
}

/// Record a formatted line in the failure log, if enabled
///
/// ```rust,ignore
/// debug_log!("suite {} case {}: {}", suite, index, sql);
/// ```
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::logging::is_enabled() {
            $crate::logging::record(format!($($arg)*));
        }
    };
}

//! Shared logging setup for the portal binary.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str =
    "portal=info,portal_coordinator=info,portal_db=info,portal_jobs=info";

/// How the console layer should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Follow the file filter (RUST_LOG or the default).
    Normal,
    /// Everything at debug and above.
    Verbose,
    /// Warnings only; stdout carries machine-readable output.
    Quiet,
}

/// Logging configuration for the portal binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub log_dir: &'a Path,
    pub console: ConsoleMode,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let segments = SegmentedLog::open(config.log_dir, config.app_name, Retention::DEFAULT)
        .with_context(|| format!("Failed to open log file in {}", config.log_dir.display()))?;

    let file_filter = env_or_default_filter();
    let console_filter = match config.console {
        ConsoleMode::Normal => env_or_default_filter(),
        ConsoleMode::Verbose => EnvFilter::new("debug"),
        ConsoleMode::Quiet => EnvFilter::new("warn"),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(segments))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn env_or_default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// How much history the file layer keeps.
#[derive(Debug, Clone, Copy)]
struct Retention {
    /// Live file plus numbered predecessors.
    segments: usize,
    segment_bytes: u64,
}

impl Retention {
    const DEFAULT: Retention = Retention {
        segments: 5,
        segment_bytes: 10 * 1024 * 1024,
    };
}

/// Size-bounded log files: `<stem>.log` is live, `<stem>.log.N` grows older with N.
struct SegmentedLog {
    dir: PathBuf,
    stem: String,
    retention: Retention,
    live: File,
    written: u64,
}

impl SegmentedLog {
    fn open(dir: &Path, app_name: &str, retention: Retention) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(app_name);
        let live_path = dir.join(format!("{stem}.log"));
        let live = OpenOptions::new().create(true).append(true).open(&live_path)?;
        let written = live.metadata()?.len();

        let mut log = Self {
            dir: dir.to_path_buf(),
            stem,
            retention: Retention {
                segments: retention.segments.max(1),
                ..retention
            },
            live,
            written,
        };
        if log.written > log.retention.segment_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    /// Index 0 is the live file.
    fn segment(&self, index: usize) -> PathBuf {
        match index {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{n}", self.stem)),
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        self.live.flush()?;

        let oldest = self.retention.segments - 1;
        if oldest == 0 {
            self.live.set_len(0)?;
            self.written = 0;
            return Ok(());
        }

        // Renaming onto the oldest slot replaces it.
        for index in (0..oldest).rev() {
            rename_if_present(&self.segment(index), &self.segment(index + 1))?;
        }

        self.live = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment(0))?;
        self.written = 0;
        Ok(())
    }
}

impl Write for SegmentedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.retention.segment_bytes {
            self.roll()?;
        }
        let n = self.live.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.live.flush()
    }
}

fn rename_if_present(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .trim()
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "portal".to_string()
    } else {
        stem
    }
}

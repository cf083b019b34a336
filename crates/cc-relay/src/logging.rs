use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "cc-relay.log";

/// Keeps the optional log file alive for the lifetime of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

pub fn init_logging(debug: bool, log_dir: Option<&Path>) -> Option<LogGuard> {
    let level = level_directive(debug, std::env::var("CC_LOG_LEVEL").ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match log_dir {
        Some(dir) => open_log_file(dir).unwrap_or_else(|err| {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }),
        None => LogGuard { file: None },
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn level_directive(debug: bool, env_level: Option<String>) -> String {
    if debug {
        return "debug".to_string();
    }
    match env_level {
        Some(level) if !level.trim().is_empty() => level,
        _ => "info".to_string(),
    }
}

fn open_log_file(dir: &Path) -> io::Result<LogGuard> {
    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

/// Stdout carries command output, so diagnostics go to stderr and the file.
struct MultiWriter {
    stderr: io::Stderr,
    file: Option<Arc<Mutex<File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<File>>>) -> Self {
        Self {
            stderr: io::stderr(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stderr.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stderr.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

// src/logging.rs
//
// Timestamped log lines on stderr, optionally mirrored into a file under the
// reports directory. Components tag their lines, e.g. `[pipeline]`.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Log a line with a local `HH:MM:SS.mmm` timestamp to stderr and, while file
/// logging is active, to the log file.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::write_line(format_args!($($arg)*))
    };
}

const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Name of the symlink that always points at the newest log file
pub const LATEST_LOG_LINK: &str = "coretemp.log";

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

fn log_file() -> MutexGuard<'static, Option<File>> {
    LOG_FILE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write one timestamped line. Called through `tlog!`.
#[doc(hidden)]
pub fn write_line(args: fmt::Arguments<'_>) {
    let line = format!("{} {}", chrono::Local::now().format(TIME_FORMAT), args);
    eprintln!("{}", line);
    if let Some(file) = log_file().as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

/// Start mirroring log lines into a new timestamped file in `reports_dir`.
/// Returns the path of the file. A previous log file, if any, is closed.
pub fn init_file_logging(reports_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(reports_dir)?;

    let name = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-coretemp.log")
        .to_string();
    let path = reports_dir.join(&name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    *log_file() = Some(file);

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let link = reports_dir.join(LATEST_LOG_LINK);
        let _ = std::fs::remove_file(&link);
        if let Err(e) = std::os::unix::fs::symlink(&name, &link) {
            tlog!("[logging] Failed to link {}: {}", LATEST_LOG_LINK, e);
        }
    }

    tlog!("[logging] Writing log to {}", path.display());
    Ok(path)
}

/// Close the log file. Later lines go to stderr only.
pub fn stop_file_logging() {
    if log_file().take().is_some() {
        tlog!("[logging] File logging stopped");
    }
}

pub fn is_file_logging() -> bool {
    log_file().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_writes_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_file_logging(dir.path()).unwrap();
        assert!(is_file_logging());
        tlog!("[logging] reading 23.5 from test");
        stop_file_logging();
        assert!(!is_file_logging());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[logging] reading 23.5 from test"));
        assert!(!contents.contains("File logging stopped"));

        #[cfg(unix)]
        assert!(dir.path().join(LATEST_LOG_LINK).exists());
    }
}

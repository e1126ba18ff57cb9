use chrono::Local;
use log::warn;
use simplelog::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Log file path: a directory (or a path ending with '/') gets a timestamped file name inside it.
pub fn log_file_path(file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_dir() || file.ends_with('/') {
        let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
        path.join(format!("dae_solver_{}.log", date_and_time))
    } else {
        path.to_path_buf()
    }
}

/// Installs a terminal logger and, if `file` is given, a file logger with the same level.
///
/// A logger installed earlier (by the application or by a previous solver run) is kept.
pub fn init_logger(level: LevelFilter, file: Option<&str>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    let mut file_error = None;
    if let Some(file) = file {
        let path = log_file_path(file);
        match File::create(&path) {
            Ok(f) => loggers.push(WriteLogger::new(level, Config::default(), f)),
            Err(e) => file_error = Some(format!("{}: {}", path.display(), e)),
        }
    }

    // fails only if a logger is already set
    let _ = CombinedLogger::init(loggers);
    if let Some(e) = file_error {
        warn!("log file could not be created: {}", e);
    }
}

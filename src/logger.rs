//  Copyright 2020 Two Sigma Investments, LP.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Supervisor-wide logger: stderr plus an optional log file, every line
//! timestamped relative to process start. `log::Record::target()` carries
//! the per-subsystem prefix ("app", "proc", "fault", "ledger", "smack",
//! "freezer") in place of a bespoke `LOGKEY` macro.

use std::{
    fs,
    io::prelude::*,
    io::stderr,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{Metadata, Record};
pub use log::LevelFilter;

use crate::consts::START_TIME;

struct Logger {
    log_file: Option<fs::File>,
    log_file_path: Option<PathBuf>,
}

impl Logger {
    fn log(&mut self, record: &Record) {
        let msg = format!(
            "[sup] ({:.3}s) {:<5} {}: {}\n",
            START_TIME.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = stderr().write_all(msg.as_bytes());
        if let Some(f) = self.log_file.as_mut() {
            let _ = f.write_all(msg.as_bytes());
        }
    }

    fn flush(&mut self) {
        let _ = stderr().flush();
        if let Some(f) = self.log_file.as_mut() {
            let _ = f.flush();
        }
    }
}

lazy_static! {
    static ref LOGGER: Mutex<Option<Logger>> = Mutex::new(None);
}

struct LoggerRef(&'static Mutex<Option<Logger>>);

impl log::Log for LoggerRef {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Some(l) = self.0.lock().unwrap().as_mut() {
            l.log(record);
        }
    }

    fn flush(&self) {
        if let Some(l) = self.0.lock().unwrap().as_mut() {
            l.flush();
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}

/// A `supervisord-<timestamp>.log` name under `SUPERVISOR_LOG_DIR`, for
/// callers that want a fresh file per run rather than a fixed path.
pub fn default_log_file_path() -> PathBuf {
    use crate::consts::SUPERVISOR_LOG_DIR;
    use chrono::Utc;
    SUPERVISOR_LOG_DIR.join(format!("supervisord-{}.log", Utc::now().format("%Y%m%d-%H%M%S")))
}

/// Initializes the global logger. Safe to call only once per process.
pub fn init(level: LevelFilter, log_file_path: Option<PathBuf>) {
    log::set_boxed_logger(Box::new(LoggerRef(&LOGGER))).expect("logger already initialized");
    log::set_max_level(level);

    let log_file = log_file_path.as_ref().and_then(|p| match open_log_file(p) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", p.display(), e);
            None
        }
    });

    LOGGER.lock().unwrap().replace(Logger {
        log_file,
        log_file_path,
    });

    log::info!(target: "sup", "supervisor starting at {}", chrono::Utc::now().to_rfc2822());
}

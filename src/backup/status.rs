//! Run logs, the persisted status record and notification fan-out.
//!
//! Every operation (`backup`, `restore`, `setup`) gets a [`StatusReporter`].
//! It appends `<timestamp> [LEVEL] message` lines to a run log, overwrites
//! `<operation>_status.log` with a [`StatusRecord`] at each milestone, and
//! sends the final outcome to every configured notification channel.

use crate::backup::artifact::{format_timestamp, timestamp_now};
use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::project_config::ProjectConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use chrono::NaiveDateTime;
use derive_more::Display;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Threshold for the run log file, `LOG_LEVEL` in the project config.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub enum LogLevel {
    #[display("DEBUG")]
    Debug,
    #[default]
    #[display("INFO")]
    Info,
    #[display("WARN")]
    Warn,
    #[display("ERROR")]
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level {other:?}, expected DEBUG, INFO, WARN or ERROR"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusPhase {
    #[display("STARTED")]
    Started,
    #[display("SUCCESS")]
    Success,
    #[display("FAILURE")]
    Failure,
}

/// The last milestone of an operation. Overwritten, never appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub phase: StatusPhase,
    pub message: String,
    pub timestamp: NaiveDateTime,
}

pub fn status_path<P: AsRef<Path>>(log_dir: P, operation: &str) -> PathBuf {
    log_dir.as_ref().join(format!("{operation}_status.log"))
}

#[named]
pub fn read_status<P: AsRef<Path>>(path: P) -> Result<StatusRecord> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(Error::from)
        .add_msg(format!("Reading status record {:?}", path))
        .add_fn_name(function_path!())?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Getters)]
#[getset(get = "pub")]
pub struct StatusReporter {
    operation: String,
    project: String,
    log_file: PathBuf,
    status_file: PathBuf,
    level: LogLevel,
    #[getset(skip)]
    notifiers: Vec<Box<dyn Notification>>,
}

impl StatusReporter {
    /// Creates `log_dir` if needed. The run log is named after the
    /// operation and the current time.
    #[named]
    pub fn new<P: AsRef<Path>>(
        log_dir: P,
        operation: &str,
        project: &str,
        level: LogLevel,
        notifiers: Vec<Box<dyn Notification>>,
    ) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)
            .map_err(Error::from)
            .add_msg(format!("Creating log directory {:?}", log_dir))
            .add_fn_name(function_path!())?;
        Ok(Self {
            operation: operation.to_string(),
            project: project.to_string(),
            log_file: log_dir.join(format!(
                "{operation}-{}.log",
                format_timestamp(&timestamp_now())
            )),
            status_file: status_path(log_dir, operation),
            level,
            notifiers,
        })
    }

    /// A reporter wired to the notification channels of `config`.
    ///
    /// When the channels cannot be built, the failure is still recorded
    /// through a reporter without channels and the error is returned.
    pub fn for_config<P: AsRef<Path>>(
        config: &ProjectConfig,
        log_dir: P,
        operation: &str,
    ) -> Result<Self> {
        let level = *config.log_level();
        match config.notifications() {
            Ok(channels) => {
                let notifiers = channels
                    .into_iter()
                    .map(|n| Box::new(n) as Box<dyn Notification>)
                    .collect();
                Self::new(log_dir, operation, config.name(), level, notifiers)
            }
            Err(e) => Self::new(log_dir, operation, config.name(), level, vec![])?
                .check_status(Err(e), "Loading notification channels"),
        }
    }

    pub fn log<S: AsRef<str>>(&self, level: LogLevel, message: S) {
        let message = message.as_ref();
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        if level < self.level {
            return;
        }

        let line = format!(
            "{} [{}] {}\n",
            timestamp_now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = res {
            tracing::warn!("Cannot write run log {:?}: {}", self.log_file, e);
        }
    }

    #[named]
    pub fn update_status<S: Into<String>>(&self, phase: StatusPhase, message: S) -> Result<()> {
        let record = StatusRecord {
            phase,
            message: message.into(),
            timestamp: timestamp_now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.status_file, json)
            .map_err(Error::from)
            .add_msg(format!("Writing status record {:?}", self.status_file))
            .add_fn_name(function_path!())?;
        tracing::debug!("{} status: {}", self.operation, record.phase);
        Ok(())
    }

    /// Sends to every channel. A failing channel is logged and does not stop the others.
    pub fn notify(&self, outcome: StatusPhase, message: &str, operation: &str) {
        let topic = format!("[{}] {} {}", self.project, operation, outcome);
        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(&topic, message) {
                self.log(LogLevel::Error, format!("Notification failed: {e}"));
            }
        }
    }

    /// Marks the operation STARTED.
    pub fn start<S: Into<String>>(&self, message: S) -> Result<()> {
        let message = message.into();
        self.log(LogLevel::Info, &message);
        self.update_status(StatusPhase::Started, message)
    }

    /// Marks the operation SUCCESS and notifies.
    pub fn succeed<S: Into<String>>(&self, message: S) -> Result<()> {
        let message = message.into();
        self.log(LogLevel::Info, &message);
        self.update_status(StatusPhase::Success, message.as_str())?;
        self.notify(StatusPhase::Success, &message, &self.operation);
        Ok(())
    }

    /// Passes `result` through. On error the failure is logged, recorded and
    /// notified before the error is handed back to the caller.
    pub fn check_status<T>(&self, result: Result<T>, step: &str) -> Result<T> {
        match result {
            Ok(v) => {
                self.log(LogLevel::Info, format!("{step}: OK"));
                Ok(v)
            }
            Err(e) => {
                let message = format!("{step} failed: {e}");
                self.log(LogLevel::Error, &message);
                let recorded = self.update_status(StatusPhase::Failure, message.as_str());
                if let Err(status_err) = recorded {
                    self.log(LogLevel::Error, status_err.to_string());
                }
                self.notify(StatusPhase::Failure, &message, &self.operation);
                Err(e.add_msg(step))
            }
        }
    }
}

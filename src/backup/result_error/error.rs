use crate::backup::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;
use std::path::PathBuf;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Globset(#[from] globset::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    LettreAddress(#[from] lettre::address::AddressError),
    #[error(transparent)]
    LettreMessage(#[from] lettre::error::Error),
    #[error(transparent)]
    LettreSmtp(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Ureq(#[from] Box<ureq::Error>),
    #[error("Config file not found: {0:?}")]
    MissingConfig(PathBuf),
    #[error("Invalid config value for {field:?}: {reason}")]
    InvalidConfig { field: String, reason: String },
    #[error("No config selected: {0}")]
    NoConfigSelected(String),
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
    #[error("Unsupported archive format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("Found {} sql files, expected exactly one: {:?}", .0.len(), .0)]
    AmbiguousArchive(Vec<PathBuf>),
    #[error("{tool} exited with {status}:\n{}", indent::indent_all_with("  ", stderr))]
    ToolFailure {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error(
        "Transfer of {artifact:?} to {destination} failed:\n{}",
        indent::indent_all_with("  ", error.to_string())
    )]
    TransferFailure {
        artifact: PathBuf,
        destination: String,
        error: Box<Error>,
    },
    #[error("SMTP server rejected message: {0}")]
    SmtpSendError(String),
    #[error("Notification request to {0} returned status {1}")]
    NotificationStatus(String, u16),
    #[error("Interrupted by signal")]
    Interrupted,
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(value: ureq::Error) -> Self {
        Self::Ureq(Box::new(value))
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Walks through context wrappers and returns the innermost error.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => error.root(),
            e => e,
        }
    }
}

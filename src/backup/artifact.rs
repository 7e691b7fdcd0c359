//! Backup artifacts and their file names.
//!
//! Every artifact is named `<kind prefix><timestamp>.<ext>`, for example
//! `DB-20240101-000000.zip` or `Files-20240101-000000.tar.gz`, so an
//! artifact found on disk can be turned back into a descriptor.

use crate::backup::archive::ArchiveFormat;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use derive_more::Display;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

pub static TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ArtifactKind {
    #[display("DB")]
    Db,
    #[display("Files")]
    Files,
}

impl ArtifactKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Db => "DB-",
            ArtifactKind::Files => "Files-",
        }
    }

    /// Classifies a file name by its `DB-` / `Files-` marker. A leading
    /// prefix wins over a marker found elsewhere in the name.
    pub fn classify(file_name: &str) -> Option<Self> {
        let kinds = [ArtifactKind::Files, ArtifactKind::Db];
        kinds
            .iter()
            .find(|k| file_name.starts_with(k.prefix()))
            .or_else(|| kinds.iter().find(|k| file_name.contains(k.prefix())))
            .copied()
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Current local time truncated to whole seconds, the resolution of artifact names.
pub fn timestamp_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Getters, CopyGetters)]
pub struct Artifact {
    #[getset(get_copy = "pub")]
    kind: ArtifactKind,
    #[getset(get_copy = "pub")]
    timestamp: NaiveDateTime,
    #[getset(get = "pub")]
    path: PathBuf,
}

impl Artifact {
    pub fn file_name(
        kind: ArtifactKind,
        timestamp: &NaiveDateTime,
        format: ArchiveFormat,
    ) -> String {
        format!(
            "{}{}.{}",
            kind.prefix(),
            format_timestamp(timestamp),
            format.file_ext().unwrap_or_default()
        )
    }

    pub fn new<P: AsRef<Path>>(
        kind: ArtifactKind,
        timestamp: NaiveDateTime,
        dir: P,
        format: ArchiveFormat,
    ) -> Self {
        Self {
            kind,
            timestamp,
            path: dir.as_ref().join(Self::file_name(kind, &timestamp, format)),
        }
    }

    /// Parses a strictly named artifact, `None` for anything else.
    pub fn parse<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;
        let kind = [ArtifactKind::Db, ArtifactKind::Files]
            .into_iter()
            .find(|k| file_name.starts_with(k.prefix()))?;
        let (stem, _) = ArchiveFormat::strip_ext(&file_name[kind.prefix().len()..])?;
        let timestamp = parse_timestamp(stem)?;
        Some(Self {
            kind,
            timestamp,
            path: path.to_path_buf(),
        })
    }

    /// Builds a descriptor for a file the operator pointed at explicitly.
    ///
    /// Names that do not follow the artifact pattern are still accepted when
    /// they carry a `DB-` or `Files-` marker; their timestamp then comes
    /// from the file's modification time.
    pub fn from_explicit_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(artifact) = Self::parse(path) {
            return Ok(artifact);
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_selection(format!("{:?} has no file name", path)))?;
        let kind = ArtifactKind::classify(file_name).ok_or_else(|| {
            Error::invalid_selection(format!(
                "{:?} is neither a DB- nor a Files- backup",
                path
            ))
        })?;
        let modified: DateTime<Local> = std::fs::metadata(path)?.modified()?.into();
        Ok(Self {
            kind,
            timestamp: modified.naive_local(),
            path: path.to_path_buf(),
        })
    }

    pub fn file_name_str(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Lists the artifacts directly inside `dir`, newest first. A missing `dir`
/// has none.
pub fn list_artifacts<P: AsRef<Path>>(dir: P) -> Result<Vec<Artifact>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_dir(dir)?
        .filter_map(|r| r.ok())
        .filter(|r| r.path().is_file())
        .filter_map(|r| Artifact::parse(r.path()))
        .sorted_by_key(|a| Reverse((a.timestamp, a.path.clone())))
        .collect())
}

/// Picks the lexicographically greatest name of each kind found directly in `dir`.
pub fn latest_in_dir<P: AsRef<Path>>(dir: P, kind: ArtifactKind) -> Result<Option<Artifact>> {
    let candidate = std::fs::read_dir(dir.as_ref())?
        .filter_map(|r| r.ok())
        .map(|r| r.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(ArtifactKind::classify)
                == Some(kind)
        })
        .max_by(|a, b| a.file_name().cmp(&b.file_name()));
    candidate.map(Artifact::from_explicit_path).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_file_name_embeds_kind_and_timestamp() {
        let name = Artifact::file_name(ArtifactKind::Files, &ts(2024, 1, 1), ArchiveFormat::Zip);
        assert_eq!(name, "Files-20240101-000000.zip");
        let name = Artifact::file_name(ArtifactKind::Db, &ts(2024, 1, 1), ArchiveFormat::Zip);
        assert_eq!(name, "DB-20240101-000000.zip");
    }

    #[test]
    fn test_files_artifact_is_never_db() {
        let artifact = Artifact::parse("/backups/Files-20240101-000000.zip").unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::Files);
        assert_eq!(artifact.timestamp(), ts(2024, 1, 1));
        assert_eq!(ArtifactKind::classify("Files-20240101-000000.zip"), Some(ArtifactKind::Files));
    }

    #[test]
    fn test_parse_rejects_other_names() {
        assert!(Artifact::parse("notes.txt").is_none());
        assert!(Artifact::parse("DB-yesterday.zip").is_none());
        assert!(Artifact::parse("Files-20240101-000000.rar").is_none());
        let artifact = Artifact::parse("Files-20240101-000000.tar.gz").unwrap();
        assert_eq!(artifact.timestamp(), ts(2024, 1, 1));
    }

    #[test]
    fn test_classify_by_marker() {
        assert_eq!(ArtifactKind::classify("site-DB-copy.zip"), Some(ArtifactKind::Db));
        assert_eq!(ArtifactKind::classify("DB-Files-odd.zip"), Some(ArtifactKind::Db));
        assert_eq!(ArtifactKind::classify("backup.zip"), None);
    }

    #[test]
    fn test_explicit_path_without_marker() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.zip");
        std::fs::write(&path, "").unwrap();
        let err = Artifact::from_explicit_path(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));

        let path = temp_dir.path().join("old-Files-copy.tar");
        std::fs::write(&path, "").unwrap();
        assert_eq!(Artifact::from_explicit_path(&path).unwrap().kind(), ArtifactKind::Files);
    }

    #[test]
    fn test_list_and_latest() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "DB-20240101-000000.zip",
            "DB-20240301-000000.zip",
            "Files-20240201-000000.tar.gz",
            "unrelated.txt",
        ] {
            std::fs::write(temp_dir.path().join(name), "").unwrap();
        }

        let all = list_artifacts(temp_dir.path()).unwrap();
        let names = all.iter().map(Artifact::file_name_str).collect_vec();
        assert_eq!(
            names,
            vec![
                "DB-20240301-000000.zip",
                "Files-20240201-000000.tar.gz",
                "DB-20240101-000000.zip"
            ]
        );

        let latest_db = latest_in_dir(temp_dir.path(), ArtifactKind::Db).unwrap().unwrap();
        assert_eq!(latest_db.file_name_str(), "DB-20240301-000000.zip");
        let latest_files = latest_in_dir(temp_dir.path(), ArtifactKind::Files).unwrap().unwrap();
        assert_eq!(latest_files.timestamp(), ts(2024, 2, 1));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        assert!(list_artifacts("/nonexistent/backups").unwrap().is_empty());
    }
}

use crate::backup::artifact::{list_artifacts, Artifact};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use chrono::{Duration, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Local retention window for artifacts, `BACKUP_RETAIN_DURATION` days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionConfig {
    retain: Duration,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl RetentionConfig {
    /// `None` when `days` is zero, which disables pruning.
    pub fn from_days(days: u32) -> Option<Self> {
        (days > 0).then(|| Self {
            retain: Duration::days(days as i64),
        })
    }

    pub fn retain(&self) -> Duration {
        self.retain
    }

    /// Artifacts strictly older than the window, oldest first.
    pub fn get_delete<'a, I>(
        &self,
        iter: I,
        now: NaiveDateTime,
    ) -> impl Iterator<Item = &'a Artifact>
    where
        I: IntoIterator<Item = &'a Artifact>,
    {
        let retain = self.retain;
        let mut expired: Vec<_> = iter
            .into_iter()
            .filter(move |a| now.signed_duration_since(a.timestamp()) > retain)
            .collect();
        expired.sort_by_key(|a| a.timestamp());
        expired.into_iter()
    }

    /// Deletes expired artifacts in `dir`, never touching `keep`.
    ///
    /// A file that cannot be removed is reported in `failed` and skipped.
    pub fn prune<P: AsRef<Path>>(
        &self,
        dir: P,
        now: NaiveDateTime,
        keep: &[PathBuf],
    ) -> Result<PruneReport> {
        let artifacts = list_artifacts(dir)?;
        let mut report = PruneReport::default();
        for artifact in self.get_delete(&artifacts, now) {
            if keep.contains(artifact.path()) {
                continue;
            }
            tracing::info!("Removing out of retention file {:?}", artifact.path());
            match std::fs::remove_file(artifact.path()) {
                Ok(_) => report.deleted.push(artifact.path().clone()),
                Err(e) => {
                    tracing::warn!("Failed to remove {:?}: {}", artifact.path(), e);
                    report.failed.push((artifact.path().clone(), e.into()));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::ArchiveFormat;
    use crate::backup::artifact::ArtifactKind;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn touch(dir: &Path, kind: ArtifactKind, age: Duration) -> Artifact {
        let artifact = Artifact::new(kind, now() - age, dir, ArchiveFormat::TarGz);
        std::fs::write(artifact.path(), "").unwrap();
        artifact
    }

    #[test]
    fn test_zero_days_disables() {
        assert!(RetentionConfig::from_days(0).is_none());
        assert_eq!(RetentionConfig::from_days(3).unwrap().retain(), Duration::days(3));
    }

    #[test]
    fn test_get_delete_only_strictly_older() {
        let dir = TempDir::new().unwrap();
        let old = touch(dir.path(), ArtifactKind::Files, Duration::days(11));
        let edge = touch(dir.path(), ArtifactKind::Files, Duration::days(10));
        let fresh = touch(dir.path(), ArtifactKind::Db, Duration::hours(1));
        let all = vec![fresh, edge, old.clone()];

        let retention = RetentionConfig::from_days(10).unwrap();
        let to_delete: Vec<_> = retention.get_delete(&all, now()).collect();
        assert_eq!(to_delete, vec![&old]);
    }

    #[test]
    fn test_prune_removes_expired_and_respects_keep() {
        let dir = TempDir::new().unwrap();
        let old_db = touch(dir.path(), ArtifactKind::Db, Duration::days(30));
        let old_files = touch(dir.path(), ArtifactKind::Files, Duration::days(12));
        let new_files = touch(dir.path(), ArtifactKind::Files, Duration::days(1));
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let retention = RetentionConfig::from_days(10).unwrap();
        let report = retention
            .prune(dir.path(), now(), &[old_db.path().clone()])
            .unwrap();

        assert_eq!(report.deleted, vec![old_files.path().clone()]);
        assert!(report.failed.is_empty());
        assert!(old_db.path().exists());
        assert!(!old_files.path().exists());
        assert!(new_files.path().exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}

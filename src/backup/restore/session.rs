use crate::backup::archive::extract_archive;
use crate::backup::artifact::{format_timestamp, Artifact};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use chrono::NaiveDateTime;
use function_name::named;
use getset::{CopyGetters, Getters};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// State of one restore invocation.
///
/// The working directory is created on first use and removed when the
/// session is closed or dropped, whichever comes first.
#[derive(Debug, Getters, CopyGetters)]
pub struct RestoreSession {
    #[getset(get = "pub")]
    db: Option<Artifact>,
    #[getset(get = "pub")]
    files: Option<Artifact>,
    #[getset(get_copy = "pub")]
    started: NaiveDateTime,
    #[getset(get_copy = "pub")]
    dry_run: bool,
    temp_root: Option<PathBuf>,
    workdir: Option<TempDir>,
}

impl RestoreSession {
    pub fn new(
        db: Option<Artifact>,
        files: Option<Artifact>,
        started: NaiveDateTime,
        dry_run: bool,
        temp_root: Option<PathBuf>,
    ) -> Self {
        Self {
            db,
            files,
            started,
            dry_run,
            temp_root,
            workdir: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_none() && self.files.is_none()
    }

    pub fn has_workdir(&self) -> bool {
        self.workdir.is_some()
    }

    #[named]
    fn workdir(&mut self) -> Result<&Path> {
        let dir = match self.workdir.take() {
            Some(dir) => dir,
            None => {
                let mut builder = tempfile::Builder::new();
                let prefix = format!("wp-restore-{}-", format_timestamp(&self.started));
                builder.prefix(&prefix);
                let dir = match &self.temp_root {
                    Some(root) => builder.tempdir_in(root),
                    None => builder.tempdir(),
                }
                .map_err(Error::from)
                .add_msg("Creating restore working directory")
                .add_fn_name(function_path!())?;
                tracing::debug!("Restore working directory {:?}", dir.path());
                dir
            }
        };
        Ok(self.workdir.insert(dir).path())
    }

    /// Unpacks `artifact` into its own subdirectory of the working directory.
    pub fn extract(&mut self, artifact: &Artifact) -> Result<PathBuf> {
        let dest = self.workdir()?.join(artifact.kind().to_string());
        extract_archive(artifact.path(), &dest)
            .add_msg(format!("Extracting {:?}", artifact.path()))?;
        Ok(dest)
    }

    /// Removes the working directory now instead of on drop.
    pub fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.workdir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            tracing::debug!("Removed {:?}", path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::ArchiveFormat;
    use crate::backup::artifact::{timestamp_now, ArtifactKind};

    #[test]
    fn test_workdir_is_lazy_and_removed() {
        let root = TempDir::new().unwrap();
        let artifact = Artifact::new(
            ArtifactKind::Db,
            timestamp_now(),
            root.path(),
            ArchiveFormat::Zip,
        );
        let mut session = RestoreSession::new(
            Some(artifact),
            None,
            timestamp_now(),
            false,
            Some(root.path().to_path_buf()),
        );
        assert!(!session.has_workdir());

        let path = session.workdir().unwrap().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("wp-restore-"));

        session.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_workdir() {
        let root = TempDir::new().unwrap();
        let path = {
            let mut session =
                RestoreSession::new(None, None, timestamp_now(), false, Some(root.path().into()));
            assert!(session.is_empty());
            session.workdir().unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_workdirs() {
        let root = TempDir::new().unwrap();
        let ts = timestamp_now();
        let mut a = RestoreSession::new(None, None, ts, false, Some(root.path().into()));
        let mut b = RestoreSession::new(None, None, ts, false, Some(root.path().into()));
        assert_ne!(a.workdir().unwrap().to_path_buf(), b.workdir().unwrap().to_path_buf());
    }
}

//! The backup run: database export, files archive, transfer, retention.

use crate::backup::archive::dump::DumpFileSource;
use crate::backup::archive::{create_archive, ArchiveFormat};
use crate::backup::artifact::{format_timestamp, timestamp_now, Artifact, ArtifactKind};
use crate::backup::command::ToolRunner;
use crate::backup::function_path;
use crate::backup::project_config::ProjectConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::RetentionConfig;
use crate::backup::status::{LogLevel, StatusReporter};
use chrono::NaiveDateTime;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use std::path::PathBuf;

#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupReport {
    timestamp: NaiveDateTime,
    artifacts: Vec<Artifact>,
    transferred: Vec<PathBuf>,
    pruned: Vec<PathBuf>,
}

pub struct BackupOrchestrator<'a> {
    config: &'a ProjectConfig,
    runner: &'a dyn ToolRunner,
    reporter: &'a StatusReporter,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        runner: &'a dyn ToolRunner,
        reporter: &'a StatusReporter,
    ) -> Self {
        Self {
            config,
            runner,
            reporter,
        }
    }

    pub fn run(&self) -> Result<BackupReport> {
        self.run_at(timestamp_now())
    }

    /// Runs every enabled phase with artifacts named after `ts`.
    ///
    /// The first failing phase aborts the run; artifacts already written
    /// stay on disk.
    pub fn run_at(&self, ts: NaiveDateTime) -> Result<BackupReport> {
        let config = self.config;
        let reporter = self.reporter;
        reporter.start(format!("Backup of {} started", config.name()))?;
        reporter.check_status(
            config
                .require(&config.backup_required_fields())
                .and_then(|_| config.require_site_dir()),
            "Configuration check",
        )?;
        reporter.check_status(
            std::fs::create_dir_all(config.full_path()).map_err(Error::from),
            "Preparing backup directory",
        )?;

        let mut report = BackupReport {
            timestamp: ts,
            artifacts: Vec::new(),
            transferred: Vec::new(),
            pruned: Vec::new(),
        };

        if *config.backup_database() {
            let artifact = reporter.check_status(self.export_database(ts), "Database backup")?;
            report.artifacts.push(artifact);
        } else {
            reporter.log(LogLevel::Info, "Database backup disabled");
        }

        if *config.backup_files() {
            let artifact = reporter.check_status(self.archive_files(ts), "Files backup")?;
            report.artifacts.push(artifact);
        } else {
            reporter.log(LogLevel::Info, "Files backup disabled");
        }

        if *config.remote_transfer() {
            let transport = config.transport();
            for artifact in &report.artifacts {
                let res = transport.transfer(
                    self.runner,
                    artifact.path(),
                    config.remote_dir(artifact.kind()),
                );
                reporter.check_status(res, &format!("Transfer of {}", artifact.file_name_str()))?;
                report.transferred.push(artifact.path().clone());
            }
        } else {
            reporter.log(LogLevel::Info, "Remote transfer disabled");
        }

        if let Some(retention) = config.retention() {
            let keep = report.artifacts.iter().map(|a| a.path().clone()).collect_vec();
            report.pruned = self.prune(&retention, ts, &keep);
        }

        reporter.succeed(format!(
            "Backup of {} completed: {}",
            config.name(),
            report.artifacts.iter().map(Artifact::file_name_str).join(", ")
        ))?;
        Ok(report)
    }

    /// Best effort: every failure is logged at WARN and the run goes on.
    fn prune(
        &self,
        retention: &RetentionConfig,
        ts: NaiveDateTime,
        keep: &[PathBuf],
    ) -> Vec<PathBuf> {
        match retention.prune(self.config.full_path(), ts, keep) {
            Ok(pruned) => {
                for (path, e) in &pruned.failed {
                    self.reporter
                        .log(LogLevel::Warn, format!("Could not delete {:?}: {e}", path));
                }
                pruned.deleted
            }
            Err(e) => {
                self.reporter
                    .log(LogLevel::Warn, format!("Retention skipped: {e}"));
                Vec::new()
            }
        }
    }

    /// Dumps into `<fullPath>/<ts>/DB/`, zips the dump to `DB-<ts>.zip` and
    /// removes the dated working directory.
    #[named]
    fn export_database(&self, ts: NaiveDateTime) -> Result<Artifact> {
        let stamp = format_timestamp(&ts);
        let work_dir = self.config.full_path().join(&stamp);
        let dump = work_dir.join("DB").join(format!("db-{stamp}.sql"));
        let artifact = Artifact::new(
            ArtifactKind::Db,
            ts,
            self.config.full_path(),
            ArchiveFormat::Zip,
        );

        let res = (|| -> Result<()> {
            std::fs::create_dir_all(work_dir.join("DB"))?;
            self.config.wp().export(self.runner, &dump)?;
            create_archive(ArchiveFormat::Zip, artifact.path(), &DumpFileSource::new(&dump))?;
            Ok(())
        })();

        if let Err(e) = std::fs::remove_dir_all(&work_dir) {
            tracing::warn!("Could not remove working directory {:?}: {}", work_dir, e);
        }
        res.add_fn_name(function_path!())?;
        self.reporter.log(
            LogLevel::Info,
            format!("Database saved to {:?}", artifact.path()),
        );
        Ok(artifact)
    }

    #[named]
    fn archive_files(&self, ts: NaiveDateTime) -> Result<Artifact> {
        let format = *self.config.compression_format();
        let artifact = Artifact::new(ArtifactKind::Files, ts, self.config.full_path(), format);
        let skipped = create_archive(format, artifact.path(), &self.config.site_files())
            .add_msg(format!("Archiving {:?}", self.config.wp_path()))
            .add_fn_name(function_path!())?;
        if let Some(e) = skipped {
            self.reporter
                .log(LogLevel::Warn, format!("Some files were skipped:\n{e}"));
        }
        self.reporter.log(
            LogLevel::Info,
            format!("Files saved to {:?}", artifact.path()),
        );
        Ok(artifact)
    }
}

//! Restoring a site from `DB-` and `Files-` artifacts.
//!
//! A restore walks `SelectSource -> Extract -> RestoreDb -> RestoreFiles ->
//! Cleanup -> Done`. The database and files phases are skipped when their
//! artifact was not selected. Any error moves the run to `Failed`; the
//! session working directory is removed on that path too.

pub mod select;
pub mod session;

use crate::backup::artifact::{format_timestamp, timestamp_now, Artifact};
use crate::backup::command::ToolRunner;
use crate::backup::function_path;
use crate::backup::project_config::{ProjectConfig, RESTORE_REQUIRED};
use crate::backup::restore::select::{Selection, Wanted};
use crate::backup::restore::session::RestoreSession;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::signal::{check_interrupted, install_interrupt_handler, interrupt_flag};
use crate::backup::status::{LogLevel, StatusReporter};
use crate::backup::sync::{copy_tree, mirror_with_delete, SyncReport};
use bon::Builder;
use derive_more::Display;
use function_name::named;
use getset::Getters;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RestorePhase {
    #[display("SELECT_SOURCE")]
    SelectSource,
    #[display("EXTRACT")]
    Extract,
    #[display("RESTORE_DB")]
    RestoreDb,
    #[display("RESTORE_FILES")]
    RestoreFiles,
    #[display("CLEANUP")]
    Cleanup,
    #[display("DONE")]
    Done,
    #[display("FAILED")]
    Failed,
}

#[derive(Clone, Debug, Default, Builder)]
pub struct RestoreOptions {
    #[builder(default)]
    pub dry_run: bool,
    /// Restore files only, the database is left alone.
    #[builder(default)]
    pub files_only: bool,
    /// Restore the database only, the site tree is left alone.
    #[builder(default)]
    pub db_only: bool,
    /// An artifact or a directory of artifacts. Prompts from `fullPath` when unset.
    #[builder(into)]
    pub source: Option<PathBuf>,
    /// Parent of the session working directory, the system temp dir when unset.
    #[builder(into)]
    pub temp_root: Option<PathBuf>,
}

impl RestoreOptions {
    pub fn wanted(&self) -> Wanted {
        Wanted {
            db: !self.files_only,
            files: !self.db_only,
        }
    }
}

#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct RestoreReport {
    phases: Vec<RestorePhase>,
    db: Option<PathBuf>,
    files: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    synced: Option<SyncReport>,
    dry_run: bool,
}

pub struct RestoreOrchestrator<'a> {
    config: &'a ProjectConfig,
    runner: &'a dyn ToolRunner,
    reporter: &'a StatusReporter,
    interrupt: &'a AtomicBool,
    handle_signals: bool,
}

/// The only `*.sql` file under `dir`.
pub fn find_single_sql(dir: &Path) -> Result<PathBuf> {
    let mut found = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|r| r.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "sql"))
        .collect::<Vec<_>>();
    match found.len() {
        0 => Err(Error::corrupt_archive(format!(
            "no .sql file in the database archive ({:?})",
            dir
        ))),
        1 => Ok(found.remove(0)),
        _ => Err(Error::ambiguous_archive(found)),
    }
}

/// `<wpPath>-pre-restore-<ts>`, next to the site.
pub fn snapshot_path(wp_path: &Path, ts: &chrono::NaiveDateTime) -> PathBuf {
    let name = wp_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "site".to_string());
    wp_path.with_file_name(format!("{name}-pre-restore-{}", format_timestamp(ts)))
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        runner: &'a dyn ToolRunner,
        reporter: &'a StatusReporter,
    ) -> Self {
        Self {
            config,
            runner,
            reporter,
            interrupt: interrupt_flag(),
            handle_signals: true,
        }
    }

    /// Polls `flag` instead of the process wide one and leaves signal
    /// dispositions alone.
    pub fn with_interrupt_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = flag;
        self.handle_signals = false;
        self
    }

    pub fn run<R: BufRead, W: Write>(
        &self,
        options: &RestoreOptions,
        input: &mut R,
        output: &mut W,
    ) -> Result<RestoreReport> {
        let mut report = RestoreReport {
            dry_run: options.dry_run,
            ..Default::default()
        };
        let mode = if options.dry_run { " (dry run)" } else { "" };
        self.reporter
            .start(format!("Restore of {} started{mode}", self.config.name()))?;

        match self.run_phases(options, input, output, &mut report) {
            Ok(()) => {
                report.phases.push(RestorePhase::Done);
                self.reporter.succeed(format!(
                    "Restore of {} completed{mode}: {}",
                    self.config.name(),
                    phase_list(&report.phases)
                ))?;
                Ok(report)
            }
            Err(e) => {
                report.phases.push(RestorePhase::Failed);
                let step = format!("Restore ({})", phase_list(&report.phases));
                self.reporter.check_status(Err(e), &step)
            }
        }
    }

    fn enter(&self, phase: RestorePhase, report: &mut RestoreReport) -> Result<()> {
        check_interrupted(self.interrupt)?;
        report.phases.push(phase);
        self.reporter.log(LogLevel::Info, format!("Phase {phase}"));
        Ok(())
    }

    #[named]
    fn run_phases<R: BufRead, W: Write>(
        &self,
        options: &RestoreOptions,
        input: &mut R,
        output: &mut W,
        report: &mut RestoreReport,
    ) -> Result<()> {
        self.config.require(RESTORE_REQUIRED)?;

        self.enter(RestorePhase::SelectSource, report)?;
        let wanted = options.wanted();
        let Selection { db, files } = match &options.source {
            Some(source) => select::from_source(source, wanted),
            None => select::interactive(self.config.full_path(), wanted, input, output),
        }
        .add_fn_name(function_path!())?;
        report.db = db.as_ref().map(|a| a.path().clone());
        report.files = files.as_ref().map(|a| a.path().clone());
        // Ctrl-C during the menu still exits right away.
        if self.handle_signals {
            install_interrupt_handler()?;
        }

        let mut session = RestoreSession::new(
            db,
            files,
            timestamp_now(),
            options.dry_run,
            options.temp_root.clone(),
        );
        if session.is_empty() {
            self.reporter.log(LogLevel::Info, "Nothing selected to restore");
        }

        self.enter(RestorePhase::Extract, report)?;
        let (db, files) = (session.db().clone(), session.files().clone());
        let db_dir = self.extract(&mut session, db)?;
        let files_dir = self.extract(&mut session, files)?;

        if let Some(db) = session.db() {
            self.enter(RestorePhase::RestoreDb, report)?;
            self.restore_db(db, db_dir.as_deref(), session.dry_run())
                .add_fn_name(function_path!())?;
        }

        if let Some(files) = session.files() {
            self.enter(RestorePhase::RestoreFiles, report)?;
            self.restore_files(files, files_dir.as_deref(), &session, report)
                .add_fn_name(function_path!())?;
        }

        self.enter(RestorePhase::Cleanup, report)?;
        session.close().add_fn_name(function_path!())?;
        Ok(())
    }

    fn extract(
        &self,
        session: &mut RestoreSession,
        artifact: Option<Artifact>,
    ) -> Result<Option<PathBuf>> {
        let Some(artifact) = artifact else {
            return Ok(None);
        };
        if session.dry_run() {
            crate::backup::archive::ArchiveFormat::from_path(artifact.path())?;
            self.reporter.log(
                LogLevel::Info,
                format!("Dry run: would extract {:?}", artifact.path()),
            );
            return Ok(None);
        }
        let dir = session.extract(&artifact)?;
        self.reporter.log(
            LogLevel::Info,
            format!("Extracted {}", artifact.file_name_str()),
        );
        Ok(Some(dir))
    }

    fn restore_db(&self, db: &Artifact, extracted: Option<&Path>, dry_run: bool) -> Result<()> {
        let wp = self.config.wp();
        let Some(dir) = extracted.filter(|_| !dry_run) else {
            self.reporter.log(
                LogLevel::Info,
                format!(
                    "Dry run: would import the dump from {} into {:?}",
                    db.file_name_str(),
                    wp.site_path()
                ),
            );
            return Ok(());
        };
        let sql = find_single_sql(dir)?;
        wp.import(self.runner, &sql)?;
        self.reporter
            .log(LogLevel::Info, format!("Imported {}", db.file_name_str()));
        Ok(())
    }

    fn restore_files(
        &self,
        files: &Artifact,
        extracted: Option<&Path>,
        session: &RestoreSession,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let wp_path = self.config.wp_path();
        let snapshot = snapshot_path(wp_path, &session.started());
        let Some(dir) = extracted.filter(|_| !session.dry_run()) else {
            self.reporter.log(
                LogLevel::Info,
                format!(
                    "Dry run: would snapshot {:?} to {:?} and mirror {} onto it",
                    wp_path,
                    snapshot,
                    files.file_name_str()
                ),
            );
            return Ok(());
        };

        let tree = dir.join("Files");
        if !tree.is_dir() {
            return Err(Error::corrupt_archive(format!(
                "{} has no Files/ directory",
                files.file_name_str()
            )));
        }

        if wp_path.is_dir() {
            copy_tree(wp_path, &snapshot, self.interrupt)
                .add_msg(format!("Snapshotting {:?}", wp_path))?;
            self.reporter
                .log(LogLevel::Info, format!("Snapshot of current site at {:?}", snapshot));
            report.snapshot = Some(snapshot);
        }
        let synced = mirror_with_delete(&tree, wp_path, self.interrupt)?;
        self.reporter.log(
            LogLevel::Info,
            format!(
                "Restored {}: {} entries copied, {} removed",
                files.file_name_str(),
                synced.copied,
                synced.removed
            ),
        );
        report.synced = Some(synced);
        Ok(())
    }
}

fn phase_list(phases: &[RestorePhase]) -> String {
    phases
        .iter()
        .map(RestorePhase::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

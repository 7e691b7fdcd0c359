//! # wp-backup
//!
//! Backup, restore and migration tooling for WordPress installations.
//!
//! ## Features
//!
//! - **Database dumps**: exported and imported through the WordPress CLI
//! - **File archives**: `zip`, `tar` or `tar.gz` with exclude globs and a size cap
//! - **Remote copies**: resumable rsync over ssh
//! - **Retention**: local artifacts older than the configured window are pruned
//! - **Restore**: dry run, files-only and database-only modes with a pre-restore snapshot
//! - **Notifications**: SMTP mail, chat webhooks and Telegram
//!
//! ## Quick Start
//!
//! ```no_run
//! use wp_backup::backup::command::SystemToolRunner;
//! use wp_backup::backup::orchestrator::BackupOrchestrator;
//! use wp_backup::backup::project_config::ProjectConfig;
//! use wp_backup::backup::status::StatusReporter;
//!
//! let config = ProjectConfig::load("configs/blog.conf")?;
//! let reporter = StatusReporter::for_config(&config, "logs", "backup")?;
//! let runner = SystemToolRunner;
//! BackupOrchestrator::new(&config, &runner, &reporter).run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;

//! Interactive wizard that writes a project config.

use crate::backup::archive::ArchiveFormat;
use crate::backup::function_path;
use crate::backup::project_config::{ProjectConfig, DEFAULT_EXCLUDE};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::status::{LogLevel, StatusReporter};
use crate::backup::validate::{validate_port, validate_project_name, validate_writable_dir};
use function_name::named;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Asks `question`, returning `default` on a blank answer.
pub fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: &str,
) -> Result<String> {
    if default.is_empty() {
        write!(output, "{question}: ")?;
    } else {
        write!(output, "{question} [{default}]: ")?;
    }
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() { default } else { answer }.to_string())
}

fn quote(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{value}\"")
    } else {
        format!("'{value}'")
    }
}

struct Answers(Vec<(&'static str, String)>);

impl Answers {
    fn ask<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        key: &'static str,
        question: &str,
        default: &str,
    ) -> Result<String> {
        let answer = prompt(input, output, question, default)?;
        if answer.contains('\'') && answer.contains('"') {
            return Err(Error::invalid_config(
                key,
                "cannot hold both single and double quotes",
            ));
        }
        self.0.push((key, answer.clone()));
        Ok(answer)
    }

    fn render(&self, project: &str) -> String {
        let mut out = format!("# wp-backup configuration for {project}\n");
        for (key, value) in &self.0 {
            out.push_str(&format!("{key}={}\n", quote(value)));
        }
        out
    }
}

fn invalid<E: ToString>(field: &str) -> impl FnOnce(E) -> Error + '_ {
    move |e| Error::invalid_config(field, e.to_string())
}

#[named]
fn ask_all<R: BufRead, W: Write>(
    config_dir: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf> {
    let project = prompt(input, output, "Project name", "")?;
    validate_project_name(&project).map_err(invalid("project name"))?;
    let path = config_dir.join(format!("{project}.conf"));
    if path.exists() {
        let question = format!("{:?} exists, overwrite? (y/N)", path);
        let overwrite = prompt(input, output, &question, "n")?;
        if !overwrite.eq_ignore_ascii_case("y") {
            return Err(Error::invalid_selection(format!("kept existing {:?}", path)));
        }
    }

    let mut answers = Answers(Vec::new());
    answers.ask(input, output, "wpPath", "WordPress root directory", "/var/www/html")?;
    answers.ask(
        input,
        output,
        "fullPath",
        "Local backup directory",
        &format!("/var/backups/{project}"),
    )?;
    answers.ask(input, output, "destinationUser", "Remote ssh user", "")?;
    answers.ask(input, output, "destinationIP", "Remote host", "")?;
    let port = answers.ask(input, output, "destinationPort", "Remote ssh port", "22")?;
    let port: u16 = port.parse().map_err(invalid("destinationPort"))?;
    validate_port(port).map_err(invalid("destinationPort"))?;
    answers.ask(input, output, "privateKeyPath", "Private key", "")?;
    answers.ask(
        input,
        output,
        "destinationDbBackupPath",
        "Remote directory for DB backups",
        &format!("/backups/{project}/db"),
    )?;
    answers.ask(
        input,
        output,
        "destinationFilesBackupPath",
        "Remote directory for Files backups",
        &format!("/backups/{project}/files"),
    )?;
    answers.ask(
        input,
        output,
        "maxSize",
        "Skip files larger than (e.g. 500m, empty for no limit)",
        "",
    )?;
    let days = answers.ask(
        input,
        output,
        "BACKUP_RETAIN_DURATION",
        "Keep local backups for days (0 keeps all)",
        "7",
    )?;
    days.parse::<u32>().map_err(invalid("BACKUP_RETAIN_DURATION"))?;
    let format = answers.ask(
        input,
        output,
        "COMPRESSION_FORMAT",
        "Compression format (zip, tar, tar.gz)",
        "tar.gz",
    )?;
    format.parse::<ArchiveFormat>().map_err(invalid("COMPRESSION_FORMAT"))?;
    answers.ask(
        input,
        output,
        "EXCLUDE_PATTERNS",
        "Exclude patterns (comma separated)",
        DEFAULT_EXCLUDE,
    )?;
    let level = answers.ask(
        input,
        output,
        "LOG_LEVEL",
        "Log level (DEBUG, INFO, WARN, ERROR)",
        "INFO",
    )?;
    level.parse::<LogLevel>().map_err(invalid("LOG_LEVEL"))?;

    let methods = answers.ask(
        input,
        output,
        "NOTIFY_METHOD",
        "Notify via (email, webhook, telegram, comma separated, empty for none)",
        "",
    )?;
    let methods = methods.to_ascii_lowercase();
    if methods.contains("email") {
        answers.ask(input, output, "SMTP_HOST", "SMTP host", "")?;
        let modes = "SMTP mode (ssl, starttls, unsecured)";
        answers.ask(input, output, "SMTP_MODE", modes, "starttls")?;
        answers.ask(input, output, "SMTP_USER", "SMTP user", "")?;
        answers.ask(input, output, "SMTP_PASSWORD", "SMTP password", "")?;
        answers.ask(input, output, "EMAIL_FROM", "Sender address", "")?;
        answers.ask(input, output, "EMAIL_TO", "Recipients (comma separated)", "")?;
    }
    if methods.contains("webhook") || methods.contains("slack") {
        answers.ask(input, output, "WEBHOOK_URL", "Webhook URL", "")?;
    }
    if methods.contains("telegram") {
        answers.ask(input, output, "TELEGRAM_BOT_TOKEN", "Telegram bot token", "")?;
        answers.ask(input, output, "TELEGRAM_CHAT_ID", "Telegram chat id", "")?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)
        .map_err(Error::from)
        .add_msg(format!("Creating {:?}", path))
        .add_fn_name(function_path!())?;
    // `mode` only applies to newly created files.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(answers.render(&project).as_bytes())?;
    drop(file);

    let config = ProjectConfig::load(&path).add_msg("Checking the written configuration")?;
    config.notifications()?;
    writeln!(output, "Saved {:?}", path)?;
    Ok(path)
}

/// Runs the wizard and records the outcome in `setup_status.log`.
pub fn run_setup<P: AsRef<Path>, R: BufRead, W: Write>(
    config_dir: P,
    input: &mut R,
    output: &mut W,
    reporter: &StatusReporter,
) -> Result<PathBuf> {
    let config_dir = config_dir.as_ref();
    reporter.start(format!("Setup started in {:?}", config_dir))?;
    let res = validate_writable_dir(config_dir)
        .map_err(|e| Error::invalid_config("config dir", e.to_string()))
        .and_then(|_| ask_all(config_dir, input, output));
    let path = reporter.check_status(res, "Setup")?;
    reporter.succeed(format!("Wrote {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::status::{read_status, StatusPhase};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn answers(site: &Path, backups: &Path) -> String {
        answers_with_user(site, backups, "backup")
    }

    fn answers_with_user(site: &Path, backups: &Path, user: &str) -> String {
        [
            "blog",
            site.to_str().unwrap(),
            backups.to_str().unwrap(),
            user,
            "10.0.0.5",
            "",
            "",
            "",
            "",
            "1g",
            "14",
            "zip",
            "",
            "debug",
            "",
        ]
        .join("\n")
            + "\n"
    }

    fn reporter(dir: &Path) -> StatusReporter {
        StatusReporter::new(dir, "setup", "setup", LogLevel::Info, vec![]).unwrap()
    }

    #[test]
    fn test_prompt_default() {
        let mut out = Vec::new();
        let answer = prompt(&mut Cursor::new("\n"), &mut out, "Port", "22").unwrap();
        assert_eq!(answer, "22");
        assert_eq!(String::from_utf8(out).unwrap(), "Port [22]: ");
        let answer = prompt(&mut Cursor::new(" 2200 \n"), &mut Vec::new(), "Port", "22").unwrap();
        assert_eq!(answer, "2200");
    }

    #[test]
    fn test_setup_writes_private_config() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("site");
        std::fs::create_dir(&site).unwrap();
        let config_dir = temp_dir.path().join("configs");
        let log_dir = temp_dir.path().join("logs");

        let path = run_setup(
            &config_dir,
            &mut Cursor::new(answers(&site, &temp_dir.path().join("b"))),
            &mut Vec::new(),
            &reporter(&log_dir),
        )
        .unwrap();

        assert_eq!(path, config_dir.join("blog.conf"));
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.wp_path(), &site);
        assert_eq!(*config.compression_format(), ArchiveFormat::Zip);
        assert_eq!(*config.destination_port(), 22);
        assert_eq!(config.max_size().bytes(), Some(1 << 30));
        assert_eq!(*config.log_level(), LogLevel::Debug);

        let status = read_status(log_dir.join("setup_status.log")).unwrap();
        assert_eq!(status.phase, StatusPhase::Success);
    }

    #[test]
    fn test_quoted_answers() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("site");
        std::fs::create_dir(&site).unwrap();
        let backups = temp_dir.path().join("b");
        let config_dir = temp_dir.path().join("configs");
        let log_dir = temp_dir.path().join("logs");

        let path = run_setup(
            &config_dir,
            &mut Cursor::new(answers_with_user(&site, &backups, "o'brien")),
            &mut Vec::new(),
            &reporter(&log_dir),
        )
        .unwrap();
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.destination_user(), "o'brien");

        std::fs::remove_file(&path).unwrap();
        let err = run_setup(
            &config_dir,
            &mut Cursor::new(answers_with_user(&site, &backups, r#"o'brien "ops""#)),
            &mut Vec::new(),
            &reporter(&log_dir),
        )
        .unwrap_err();
        match err.root() {
            Error::InvalidConfig { field, .. } => assert_eq!(field, "destinationUser"),
            e => panic!("Expected InvalidConfig, got {e}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_setup_rejects_bad_project_name() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let err = run_setup(
            temp_dir.path().join("configs"),
            &mut Cursor::new("my blog/../x\n"),
            &mut Vec::new(),
            &reporter(&log_dir),
        )
        .unwrap_err();
        assert!(matches!(err.root(), Error::InvalidConfig { .. }));

        let status = read_status(log_dir.join("setup_status.log")).unwrap();
        assert_eq!(status.phase, StatusPhase::Failure);
    }

    #[test]
    fn test_setup_keeps_existing_config() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("blog.conf"), "wpPath=/x\n").unwrap();
        let err = run_setup(
            temp_dir.path(),
            &mut Cursor::new("blog\n\n"),
            &mut Vec::new(),
            &reporter(&temp_dir.path().join("logs")),
        )
        .unwrap_err();
        assert!(matches!(err.root(), Error::InvalidSelection(_)));
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("blog.conf")).unwrap(),
            "wpPath=/x\n"
        );
    }
}

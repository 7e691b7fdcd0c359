//! Per-project configuration.
//!
//! A project is one WordPress site. Its configuration lives in
//! `<config dir>/<project>.conf` as shell style `KEY=value` lines, or in a
//! `.yml`/`.yaml` file with the same keys. Numbers and booleans may be quoted
//! in either form.

use crate::backup::archive::walkdir_globset::{CustomDeserializedGlob, SiteFilesSource};
use crate::backup::archive::ArchiveFormat;
use crate::backup::artifact::ArtifactKind;
use crate::backup::database::WpCli;
use crate::backup::function_path;
use crate::backup::notifications::smtp::{SmtpMode, SmtpNotificationConfig};
use crate::backup::notifications::telegram::TelegramNotificationConfig;
use crate::backup::notifications::webhook::WebhookNotificationConfig;
use crate::backup::notifications::NotificationConfig;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::RetentionConfig;
use crate::backup::status::LogLevel;
use crate::backup::transport::RsyncTransport;
use crate::backup::validate::{validate_dir_exist, validate_port};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::Mailbox;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use serde_with::formats::CommaSeparator;
use serde_with::{serde_as, DisplayFromStr, PickFirst, StringWithSeparator};
use std::fmt::Formatter;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validator::{Validate, ValidationError};

pub const DEFAULT_EXCLUDE: &str = "wp-content/cache/**";

/// Keys `backup` refuses to run without.
pub const BACKUP_REQUIRED: &[&str] = &["wpPath", "fullPath"];
/// Extra keys needed when `REMOTE_TRANSFER` is on.
pub const TRANSFER_REQUIRED: &[&str] = &[
    "destinationUser",
    "destinationIP",
    "destinationDbBackupPath",
    "destinationFilesBackupPath",
];
pub const RESTORE_REQUIRED: &[&str] = &["wpPath"];

const CONFIG_EXTENSIONS: [&str; 3] = ["conf", "yml", "yaml"];

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_wp_cli() -> String {
    "wp".to_string()
}

type GlobList = StringWithSeparator<CommaSeparator, CustomDeserializedGlob>;

// The validator derive hands Copy fields to custom checks by value.
fn validate_destination_port(port: u16) -> std::result::Result<(), ValidationError> {
    validate_port(port)
}

fn default_exclude() -> Vec<CustomDeserializedGlob> {
    DEFAULT_EXCLUDE.parse().into_iter().collect()
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Validate, Getters)]
#[getset(get = "pub")]
pub struct ProjectConfig {
    /// File stem of the config file.
    #[serde(skip)]
    name: String,

    /// May not exist yet when restoring onto a new host.
    #[serde(rename = "wpPath", default)]
    wp_path: PathBuf,
    #[serde(rename = "fullPath", default)]
    full_path: PathBuf,

    #[serde(rename = "destinationUser", default)]
    destination_user: String,
    #[serde(rename = "destinationIP", alias = "destinationIp", default)]
    destination_ip: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "destinationPort", default = "default_port")]
    #[validate(custom(function = validate_destination_port))]
    destination_port: u16,
    #[serde(rename = "privateKeyPath", default)]
    private_key_path: Option<PathBuf>,
    #[serde(rename = "destinationDbBackupPath", default)]
    destination_db_backup_path: String,
    #[serde(rename = "destinationFilesBackupPath", default)]
    destination_files_backup_path: String,

    #[serde(rename = "maxSize", default)]
    max_size: SizeLimit,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "BACKUP_RETAIN_DURATION", default)]
    backup_retain_duration: u32,
    #[serde(rename = "COMPRESSION_FORMAT", default)]
    compression_format: ArchiveFormat,
    #[serde_as(as = "PickFirst<(_, GlobList)>")]
    #[serde(rename = "EXCLUDE_PATTERNS", default = "default_exclude")]
    exclude_patterns: Vec<CustomDeserializedGlob>,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "BACKUP_DATABASE", default = "default_true")]
    backup_database: bool,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "BACKUP_FILES", default = "default_true")]
    backup_files: bool,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "REMOTE_TRANSFER", default = "default_true")]
    remote_transfer: bool,
    /// KiB/s handed to rsync.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "BANDWIDTH_LIMIT", default)]
    bandwidth_limit: Option<u32>,
    #[serde(rename = "WP_CLI", default = "default_wp_cli")]
    wp_cli: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "WP_CLI_ALLOW_ROOT", default)]
    wp_cli_allow_root: bool,

    #[serde(rename = "LOG_LEVEL", default)]
    log_level: LogLevel,
    #[serde(rename = "NOTIFY_METHOD", default)]
    notify_method: Option<String>,

    #[serde(rename = "SMTP_HOST", default)]
    smtp_host: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "SMTP_PORT", default)]
    smtp_port: Option<u16>,
    #[serde(rename = "SMTP_MODE", default)]
    smtp_mode: SmtpMode,
    #[serde(rename = "SMTP_USER", default)]
    smtp_user: Option<String>,
    #[serde(rename = "SMTP_PASSWORD", default)]
    smtp_password: Option<RedactedString>,
    #[serde(rename = "EMAIL_FROM", default)]
    email_from: Option<String>,
    #[serde(rename = "EMAIL_TO", default)]
    email_to: Option<String>,
    #[serde(rename = "WEBHOOK_URL", alias = "SLACK_WEBHOOK_URL", default)]
    webhook_url: Option<String>,
    #[serde(rename = "TELEGRAM_BOT_TOKEN", default)]
    telegram_bot_token: Option<RedactedString>,
    #[serde(rename = "TELEGRAM_CHAT_ID", default)]
    telegram_chat_id: Option<String>,
}

/// `maxSize`: a byte count with an optional `k`, `m` or `g` suffix.
/// Empty or zero means no limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SizeLimit(Option<u64>);

impl SizeLimit {
    pub fn bytes(&self) -> Option<u64> {
        self.0
    }
}

impl FromStr for SizeLimit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let s = s.strip_suffix('b').unwrap_or(&s);
        if s.is_empty() {
            return Ok(SizeLimit(None));
        }
        let (digits, multiplier) = match s.chars().last() {
            Some('k') => (&s[..s.len() - 1], 1024),
            Some('m') => (&s[..s.len() - 1], 1024 * 1024),
            Some('g') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
            _ => (s, 1),
        };
        let value: u64 = digits
            .trim()
            .parse()
            .map_err(|e| format!("invalid size {s:?}: {e}"))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("size {s:?} is too large"))?;
        Ok(SizeLimit((bytes > 0).then_some(bytes)))
    }
}

struct SizeLimitVisitor;

impl Visitor<'_> for SizeLimitVisitor {
    type Value = SizeLimit;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a size such as 500m, or a byte count")
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(SizeLimit((v > 0).then_some(v)))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .map_err(serde::de::Error::custom)
            .and_then(|v| self.visit_u64(v))
    }
}

impl<'de> Deserialize<'de> for SizeLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SizeLimitVisitor)
    }
}

/// Parses shell style `KEY=value` assignments.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// dropped, and one pair of surrounding quotes is removed. Keys with an
/// empty value are left out so their defaults apply.
pub fn parse_key_values(content: &str) -> Map<String, Value> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), unquote(value.trim())))
        })
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.split_once(quote))
            .map(|(inner, _)| inner)
        {
            return inner.to_string();
        }
    }
    // Unquoted values end at an inline comment.
    match value.split_once(" #") {
        Some((v, _)) => v.trim_end().to_string(),
        None => value.to_string(),
    }
}

fn is_config_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e))
}

/// Config files in `dir`, sorted by name.
pub fn list_configs<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    std::fs::read_dir(dir.as_ref())
        .map(|rd| {
            rd.filter_map(|r| r.ok())
                .map(|r| r.path())
                .filter(|p| is_config_file(p))
                .sorted()
                .collect()
        })
        .unwrap_or_default()
}

/// Lists the configs in `dir` and lets the operator pick one by number.
pub fn select_config<P: AsRef<Path>, R: BufRead, W: Write>(
    dir: P,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let configs = list_configs(dir);
    if configs.is_empty() {
        return Err(Error::no_config_selected(format!(
            "no configuration files in {:?}",
            dir
        )));
    }

    writeln!(output, "Available configurations:")?;
    for (i, path) in configs.iter().enumerate() {
        let name = path.file_stem().unwrap_or_default().to_string_lossy();
        writeln!(output, "  {}) {}", i + 1, name)?;
    }
    write!(output, "Select a configuration [1-{}]: ", configs.len())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    answer
        .parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| configs.get(i))
        .cloned()
        .ok_or_else(|| Error::no_config_selected(format!("{answer:?} is not a listed number")))
}

impl ProjectConfig {
    #[named]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::missing_config(path));
        }
        let content = std::fs::read_to_string(path)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => {
                serde_yml::from_str::<Self>(&content).map_err(|e| e.to_string())
            }
            _ => serde_json::from_value::<Self>(Value::Object(parse_key_values(&content)))
                .map_err(|e| e.to_string()),
        };
        let mut config = parsed
            .map_err(|reason| Error::invalid_config(path.display().to_string(), reason))
            .add_fn_name(function_path!())?;
        config.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", path))
            .add_fn_name(function_path!())?;
        tracing::debug!("Loaded project {:?} from {:?}", config.name, path);
        Ok(config)
    }

    /// Fails with `InvalidConfig` on the first of `fields` that is empty.
    pub fn require(&self, fields: &[&str]) -> Result<()> {
        for field in fields {
            let empty = match *field {
                "wpPath" => self.wp_path.as_os_str().is_empty(),
                "fullPath" => self.full_path.as_os_str().is_empty(),
                "destinationUser" => self.destination_user.trim().is_empty(),
                "destinationIP" => self.destination_ip.trim().is_empty(),
                "destinationDbBackupPath" => {
                    self.destination_db_backup_path.trim().is_empty()
                }
                "destinationFilesBackupPath" => {
                    self.destination_files_backup_path.trim().is_empty()
                }
                "privateKeyPath" => self.private_key_path.is_none(),
                other => {
                    return Err(Error::invalid_config(other, "not a known configuration key"))
                }
            };
            if empty {
                return Err(Error::invalid_config(*field, "required but empty"));
            }
        }
        Ok(())
    }

    /// Fails with `InvalidConfig` unless `wpPath` is an existing directory.
    pub fn require_site_dir(&self) -> Result<()> {
        validate_dir_exist(&self.wp_path)
            .map_err(|e| Error::invalid_config("wpPath", e.to_string()))
    }

    /// Keys a backup run needs with the current switches.
    pub fn backup_required_fields(&self) -> Vec<&'static str> {
        let mut fields = BACKUP_REQUIRED.to_vec();
        if self.remote_transfer {
            fields.extend_from_slice(TRANSFER_REQUIRED);
        }
        fields
    }

    pub fn retention(&self) -> Option<RetentionConfig> {
        RetentionConfig::from_days(self.backup_retain_duration)
    }

    pub fn wp(&self) -> WpCli {
        WpCli::builder()
            .binary(self.wp_cli.as_str())
            .site_path(self.wp_path.clone())
            .allow_root(self.wp_cli_allow_root)
            .build()
    }

    pub fn transport(&self) -> RsyncTransport {
        RsyncTransport::builder()
            .user(self.destination_user.as_str())
            .host(self.destination_ip.as_str())
            .port(self.destination_port)
            .maybe_private_key(self.private_key_path.clone())
            .maybe_bandwidth_limit(self.bandwidth_limit)
            .build()
    }

    pub fn remote_dir(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Db => &self.destination_db_backup_path,
            ArtifactKind::Files => &self.destination_files_backup_path,
        }
    }

    /// The site tree to archive. A backup directory inside the site is
    /// excluded so archives never contain earlier archives.
    pub fn site_files(&self) -> SiteFilesSource {
        let mut exclude = self.exclude_patterns.clone();
        if let Ok(rel) = self.full_path.strip_prefix(&self.wp_path) {
            let rel = rel.to_string_lossy();
            if !rel.is_empty() {
                exclude.extend(
                    [rel.to_string(), format!("{rel}/**")]
                        .iter()
                        .filter_map(|p| p.parse().ok()),
                );
            }
        }
        SiteFilesSource::builder()
            .src_dir(self.wp_path.clone())
            .exclude(exclude)
            .maybe_max_size(self.max_size.bytes())
            .build()
    }

    /// Builds the channels listed in `NOTIFY_METHOD`.
    pub fn notifications(&self) -> Result<Vec<NotificationConfig>> {
        let Some(methods) = &self.notify_method else {
            return Ok(Vec::new());
        };
        methods
            .split(',')
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty() && m != "none")
            .map(|method| {
                let config: NotificationConfig = match method.as_str() {
                    "email" | "mail" | "smtp" => self.smtp_notification()?.into(),
                    "webhook" | "slack" => WebhookNotificationConfig::builder()
                        .url(required(&self.webhook_url, "WEBHOOK_URL")?)
                        .build()
                        .into(),
                    "telegram" => TelegramNotificationConfig::builder()
                        .bot_token(
                            self.telegram_bot_token
                                .clone()
                                .ok_or_else(|| missing_for_notify("TELEGRAM_BOT_TOKEN"))?,
                        )
                        .chat_id(required(&self.telegram_chat_id, "TELEGRAM_CHAT_ID")?)
                        .build()
                        .into(),
                    other => {
                        return Err(Error::invalid_config(
                            "NOTIFY_METHOD",
                            format!(
                                "unknown method {other:?}, \
                                 expected email, webhook, slack or telegram"
                            ),
                        ))
                    }
                };
                validate_notification(config)
            })
            .collect()
    }

    fn smtp_notification(&self) -> Result<SmtpNotificationConfig> {
        let from: Mailbox = required(&self.email_from, "EMAIL_FROM")?
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                Error::invalid_config("EMAIL_FROM", e.to_string())
            })?;
        let to = required(&self.email_to, "EMAIL_TO")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Mailbox>()
                    .map_err(|e| Error::invalid_config("EMAIL_TO", format!("{s:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SmtpNotificationConfig::builder()
            .host(required(&self.smtp_host, "SMTP_HOST")?)
            .maybe_port(self.smtp_port)
            .smtp_mode(self.smtp_mode)
            .from(from)
            .to(to)
            .maybe_username(self.smtp_user.clone())
            .maybe_password(self.smtp_password.clone())
            .build())
    }
}

fn missing_for_notify(field: &str) -> Error {
    Error::invalid_config(field, "required by NOTIFY_METHOD but empty")
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing_for_notify(field))
}

fn validate_notification(config: NotificationConfig) -> Result<NotificationConfig> {
    config
        .validate()
        .map_err(Error::from)
        .add_msg(format!("Invalid {} notification settings", config.channel()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_shell_config() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("site");
        std::fs::create_dir(&site).unwrap();
        let path = write(
            temp_dir.path(),
            "blog.conf",
            &format!(
                r#"# blog backups
wpPath="{}"
export fullPath='/var/backups/blog'
destinationUser=backup
destinationIP=10.0.0.5
destinationPort="2222"
maxSize=500m
BACKUP_RETAIN_DURATION=10   # days
COMPRESSION_FORMAT=zip
BANDWIDTH_LIMIT=
SOME_OLD_KEY=ignored
"#,
                site.display()
            ),
        );

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.name(), "blog");
        assert_eq!(config.wp_path(), &site);
        assert_eq!(config.full_path(), Path::new("/var/backups/blog"));
        assert_eq!(*config.destination_port(), 2222);
        assert_eq!(config.max_size().bytes(), Some(500 * 1024 * 1024));
        assert_eq!(*config.compression_format(), ArchiveFormat::Zip);
        assert_eq!(*config.bandwidth_limit(), None);
        assert!(*config.remote_transfer());
        assert_eq!(config.retention().unwrap().retain(), chrono::Duration::days(10));
        assert_eq!(config.exclude_patterns().len(), 1);
        assert_eq!(*config.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_load_yaml_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            temp_dir.path(),
            "shop.yml",
            r#"
fullPath: /srv/backups/shop
destinationPort: 2200
maxSize: 1048576
EXCLUDE_PATTERNS:
  - "wp-content/cache/**"
  - "*.log"
REMOTE_TRANSFER: "false"
LOG_LEVEL: debug
"#,
        );
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.name(), "shop");
        assert_eq!(*config.destination_port(), 2200);
        assert_eq!(config.max_size().bytes(), Some(1048576));
        assert_eq!(config.exclude_patterns().len(), 2);
        assert!(!*config.remote_transfer());
        assert_eq!(*config.log_level(), LogLevel::Debug);
        assert!(config.retention().is_none());
    }

    #[test]
    fn test_exclude_patterns_comma_list() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            temp_dir.path(),
            "a.conf",
            "EXCLUDE_PATTERNS=wp-content/cache/**, wp-content/upgrade/**,*.log\n",
        );
        let config = ProjectConfig::load(&path).unwrap();
        let globs = config
            .exclude_patterns()
            .iter()
            .map(|g| g.glob().glob().to_string())
            .collect_vec();
        assert_eq!(globs, vec!["wp-content/cache/**", "wp-content/upgrade/**", "*.log"]);
    }

    #[test]
    fn test_missing_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(temp_dir.path().join("none.conf")).unwrap_err();
        assert!(matches!(err, Error::MissingConfig(_)));

        let path = write(temp_dir.path(), "bad.conf", "destinationPort=ssh\n");
        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(matches!(err.root(), Error::InvalidConfig { .. }));

        let path = write(temp_dir.path(), "zero.conf", "destinationPort=0\n");
        assert!(matches!(
            ProjectConfig::load(&path).unwrap_err().root(),
            Error::ValidationError(_)
        ));
    }

    #[test]
    fn test_site_dir_checked_only_on_demand() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("newsite");
        let path = write(temp_dir.path(), "fresh.conf", &format!("wpPath={}\n", site.display()));
        let config = ProjectConfig::load(&path).unwrap();
        assert!(config.require(RESTORE_REQUIRED).is_ok());
        match config.require_site_dir().unwrap_err() {
            Error::InvalidConfig { field, .. } => assert_eq!(field, "wpPath"),
            e => panic!("Expected InvalidConfig, got {e}"),
        }

        std::fs::create_dir(&site).unwrap();
        assert!(config.require_site_dir().is_ok());
    }

    #[test]
    fn test_require() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "p.conf", "fullPath=/b\n");
        let config = ProjectConfig::load(&path).unwrap();
        assert!(config.require(&["fullPath"]).is_ok());
        match config.require(BACKUP_REQUIRED).unwrap_err() {
            Error::InvalidConfig { field, .. } => assert_eq!(field, "wpPath"),
            e => panic!("Expected InvalidConfig, got {e}"),
        }
        assert_eq!(config.backup_required_fields().len(), 6);
    }

    #[test]
    fn test_size_limit() {
        assert_eq!("".parse::<SizeLimit>().unwrap().bytes(), None);
        assert_eq!("0".parse::<SizeLimit>().unwrap().bytes(), None);
        assert_eq!("2k".parse::<SizeLimit>().unwrap().bytes(), Some(2048));
        assert_eq!("1G".parse::<SizeLimit>().unwrap().bytes(), Some(1 << 30));
        assert_eq!("10MB".parse::<SizeLimit>().unwrap().bytes(), Some(10 << 20));
        assert!("lots".parse::<SizeLimit>().is_err());
    }

    #[test]
    fn test_unquote() {
        let map = parse_key_values("A=\"x # y\" # c\nB='q'\nC=plain # comment\nexport D=1\n=no\n");
        assert_eq!(map["A"], "x # y");
        assert_eq!(map["B"], "q");
        assert_eq!(map["C"], "plain");
        assert_eq!(map["D"], "1");
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_notifications() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            temp_dir.path(),
            "n.conf",
            "NOTIFY_METHOD=email, slack,telegram\n\
             SMTP_HOST=smtp.example.com\nSMTP_MODE=ssl\nSMTP_USER=u\nSMTP_PASSWORD=p\n\
             EMAIL_FROM=wp@example.com\nEMAIL_TO=a@example.com, b@example.com\n\
             WEBHOOK_URL=https://hooks.slack.com/services/T/B/X\n\
             TELEGRAM_BOT_TOKEN=1:abc\nTELEGRAM_CHAT_ID=42\n",
        );
        let config = ProjectConfig::load(&path).unwrap();
        let channels = config.notifications().unwrap();
        assert_eq!(
            channels.iter().map(NotificationConfig::channel).collect_vec(),
            vec!["email", "webhook", "telegram"]
        );
        match &channels[0] {
            NotificationConfig::Smtp(smtp) => {
                assert_eq!(smtp.to().len(), 2);
                assert_eq!(*smtp.smtp_mode(), SmtpMode::Ssl);
            }
            other => panic!("Expected smtp, got {other:?}"),
        }
        assert!(!format!("{:?}", config).contains("1:abc"));
    }

    #[test]
    fn test_notification_missing_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "n.conf", "NOTIFY_METHOD=telegram\nTELEGRAM_CHAT_ID=1\n");
        let err = ProjectConfig::load(&path).unwrap().notifications().unwrap_err();
        match err {
            Error::InvalidConfig { field, .. } => assert_eq!(field, "TELEGRAM_BOT_TOKEN"),
            e => panic!("Expected InvalidConfig, got {e}"),
        }

        let path = write(temp_dir.path(), "p.conf", "NOTIFY_METHOD=pigeon\n");
        assert!(ProjectConfig::load(&path).unwrap().notifications().is_err());
    }

    #[test]
    fn test_site_files_excludes_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("site");
        std::fs::create_dir(&site).unwrap();
        let path = write(
            temp_dir.path(),
            "s.conf",
            &format!("wpPath={0}\nfullPath={0}/backups\n", site.display()),
        );
        let source = ProjectConfig::load(&path).unwrap().site_files();
        assert_eq!(source.exclude().len(), 3);
    }

    #[test]
    fn test_select_config() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "b.conf", "");
        write(temp_dir.path(), "a.yml", "");
        write(temp_dir.path(), "notes.txt", "");

        let mut output = Vec::new();
        let selected =
            select_config(temp_dir.path(), &mut Cursor::new("2\n"), &mut output).unwrap();
        assert_eq!(selected.file_name().unwrap(), "b.conf");
        let menu = String::from_utf8(output).unwrap();
        assert!(menu.contains("1) a"));
        assert!(!menu.contains("notes"));

        for answer in ["3\n", "0\n", "x\n", ""] {
            let err = select_config(temp_dir.path(), &mut Cursor::new(answer), &mut Vec::new())
                .unwrap_err();
            assert!(matches!(err, Error::NoConfigSelected(_)));
        }

        let empty = TempDir::new().unwrap();
        let err = select_config(empty.path(), &mut Cursor::new("1\n"), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::NoConfigSelected(_)));
    }
}

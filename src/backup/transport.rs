use crate::backup::command::{ToolCommand, ToolRunner};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::Getters;
use std::path::{Path, PathBuf};

/// Copies artifacts to the backup host with rsync over ssh.
///
/// `--partial` keeps interrupted transfers so the next run resumes them;
/// retrying is left to rsync itself.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct RsyncTransport {
    #[builder(default = "rsync".to_string(), into)]
    binary: String,
    #[builder(into)]
    user: String,
    #[builder(into)]
    host: String,
    #[builder(default = 22)]
    port: u16,
    #[builder(into)]
    private_key: Option<PathBuf>,
    /// KiB per second, passed to `--bwlimit`.
    bandwidth_limit: Option<u32>,
}

/// Quotes `arg` for the command string rsync splits for `-e`. Inside double
/// quotes rsync honours a backslash before `"` and `\`.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || "'\"\\".contains(c)) {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

impl RsyncTransport {
    pub fn destination(&self, remote_dir: &str) -> String {
        format!("{}@{}:{}/", self.user, self.host, remote_dir.trim_end_matches('/'))
    }

    fn ssh_command(&self) -> String {
        let mut ssh = format!("ssh -p {}", self.port);
        if let Some(key) = &self.private_key {
            ssh.push_str(&format!(" -i {}", quote_arg(&key.to_string_lossy())));
        }
        ssh.push_str(" -o BatchMode=yes");
        ssh
    }

    pub fn command(&self, artifact: &Path, remote_dir: &str) -> ToolCommand {
        let cmd = ToolCommand::new(self.binary.as_str()).args(["-az", "--partial"]);
        let cmd = match self.bandwidth_limit {
            Some(limit) => cmd.arg(format!("--bwlimit={limit}")),
            None => cmd,
        };
        cmd.arg("-e")
            .arg(self.ssh_command())
            .arg(artifact.to_string_lossy())
            .arg(self.destination(remote_dir))
    }

    pub fn transfer<R: ToolRunner + ?Sized>(
        &self,
        runner: &R,
        artifact: &Path,
        remote_dir: &str,
    ) -> Result<()> {
        let cmd = self.command(artifact, remote_dir);
        let destination = self.destination(remote_dir);
        tracing::info!("Transferring {:?} to {}", artifact, destination);
        runner
            .run(&cmd)
            .and_then(|out| out.check(&cmd))
            .map(|_| ())
            .map_err(|e| Error::transfer_failure(artifact, destination, e))
    }
}

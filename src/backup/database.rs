use crate::backup::command::{ToolCommand, ToolRunner};
use crate::backup::function_path;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use std::path::{Path, PathBuf};

/// Database export/import through the WordPress CLI.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct WpCli {
    #[builder(default = "wp".to_string(), into)]
    binary: String,
    #[builder(into)]
    site_path: PathBuf,
    #[builder(default)]
    allow_root: bool,
}

impl WpCli {
    fn db_command(&self, action: &str, file: &Path) -> ToolCommand {
        let cmd = ToolCommand::new(self.binary.as_str())
            .args(["db", action])
            .arg(file.to_string_lossy())
            .arg(format!("--path={}", self.site_path.display()));
        if self.allow_root {
            cmd.arg("--allow-root")
        } else {
            cmd
        }
    }

    #[named]
    pub fn export<R: ToolRunner + ?Sized>(&self, runner: &R, out_file: &Path) -> Result<()> {
        let cmd = self.db_command("export", out_file);
        tracing::info!("Exporting database of {:?} to {:?}", self.site_path, out_file);
        runner
            .run(&cmd)
            .and_then(|out| out.check(&cmd))
            .add_msg("Database export failed")
            .add_fn_name(function_path!())?;
        Ok(())
    }

    #[named]
    pub fn import<R: ToolRunner + ?Sized>(&self, runner: &R, sql_file: &Path) -> Result<()> {
        let cmd = self.db_command("import", sql_file);
        tracing::info!("Importing {:?} into the database of {:?}", sql_file, self.site_path);
        runner
            .run(&cmd)
            .and_then(|out| out.check(&cmd))
            .add_msg("Database import failed")
            .add_fn_name(function_path!())?;
        Ok(())
    }
}

pub mod archive;
pub mod artifact;
pub mod command;
pub mod compress;
pub mod database;
pub mod file_ext;
pub mod finish;
pub mod notifications;
pub mod orchestrator;
pub mod project_config;
pub mod redacted;
pub mod restore;
pub mod result_error;
pub mod retention;
pub mod setup;
pub mod signal;
pub mod status;
pub mod sync;
pub mod transport;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;

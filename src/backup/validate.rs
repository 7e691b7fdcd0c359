//! Validation functions for configuration values.
//!
//! Used by `validator` custom field checks and by the setup wizard when it
//! accepts answers from the operator.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

pub fn validate_project_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() {
        return Err(ValidationError::new("InvalidProjectName")
            .with_message("project name must not be empty".into()));
    }

    if !is_sanitized(name) || name.contains(' ') {
        return Err(ValidationError::new("InvalidProjectName").with_message(
            format!(
                "Invalid project name, try sanitizing like {:?}",
                sanitize(name).replace(' ', "-")
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::new("InvalidPort")
            .with_message("destinationPort must be between 1 and 65535".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_name() {
        assert!(validate_project_name("my-blog").is_ok());
        assert!(validate_project_name("").is_err());
        assert!(validate_project_name("a/b").is_err());
        assert!(validate_project_name("my blog").is_err());
    }

    #[test]
    fn test_dir_exist() {
        let temp_dir = TempDir::new().unwrap();
        assert!(validate_dir_exist(temp_dir.path()).is_ok());
        assert!(validate_dir_exist(temp_dir.path().join("missing")).is_err());
        assert!(validate_dir_exist("").is_ok());

        let file = temp_dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_dir_exist(&file).is_err());
    }

    #[test]
    fn test_writable_dir_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");
        assert!(validate_writable_dir(&nested).is_ok());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_port() {
        assert!(validate_port(22).is_ok());
        assert!(validate_port(0).is_err());
    }
}

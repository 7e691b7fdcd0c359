//! Local tree copies used by restore: the pre-restore snapshot (plain copy)
//! and the mirror of an extracted `Files/` tree onto the live site.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::signal::check_interrupted;
use function_name::named;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: usize,
    pub removed: usize,
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copies `src` into `dst` without deleting anything already in `dst`.
///
/// Returns the paths, relative to `src`, that were written. `interrupt` is
/// checked before every entry.
#[named]
pub fn copy_tree(src: &Path, dst: &Path, interrupt: &AtomicBool) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        check_interrupted(interrupt)?;
        let entry = entry.map_err(Error::from).add_fn_name(function_path!())?;
        let rel = entry.path().strip_prefix(src)?.to_path_buf();
        let target = dst.join(&rel);
        let file_type = entry.file_type();

        let res = (|| -> std::io::Result<()> {
            if file_type.is_dir() {
                if fs::symlink_metadata(&target).is_ok_and(|md| !md.is_dir()) {
                    fs::remove_file(&target)?;
                }
                fs::create_dir_all(&target)?;
                fs::set_permissions(&target, entry.metadata()?.permissions())?;
            } else if file_type.is_symlink() {
                remove_any(&target)?;
                std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
            } else {
                if fs::symlink_metadata(&target).is_ok_and(|md| !md.is_file()) {
                    remove_any(&target)?;
                }
                fs::copy(entry.path(), &target)?;
            }
            Ok(())
        })();
        res.map_err(Error::from)
            .add_msg(format!("Copying {:?} to {:?}", entry.path(), target))
            .add_fn_name(function_path!())?;
        written.push(rel);
    }
    Ok(written)
}

/// Makes `dst` an exact copy of `src`, deleting whatever `src` does not have.
#[named]
pub fn mirror_with_delete(src: &Path, dst: &Path, interrupt: &AtomicBool) -> Result<SyncReport> {
    fs::create_dir_all(dst)?;
    let written: HashSet<PathBuf> = copy_tree(src, dst, interrupt)?.into_iter().collect();

    let extraneous: Vec<PathBuf> = WalkDir::new(dst)
        .follow_links(false)
        .contents_first(true)
        .min_depth(1)
        .into_iter()
        .filter_map(|r| r.ok())
        .filter_map(|de| {
            let rel = de.path().strip_prefix(dst).ok()?.to_path_buf();
            (!written.contains(&rel)).then(|| de.into_path())
        })
        .collect();

    let mut removed = 0;
    for path in extraneous {
        check_interrupted(interrupt)?;
        if fs::symlink_metadata(&path).is_err() {
            continue;
        }
        tracing::debug!("Deleting {:?}, not present in backup", path);
        remove_any(&path)
            .map_err(Error::from)
            .add_msg(format!("Deleting {:?}", path))
            .add_fn_name(function_path!())?;
        removed += 1;
    }

    let report = SyncReport {
        copied: written.len(),
        removed,
    };
    tracing::info!(
        "Mirrored {:?} onto {:?}: {} entries copied, {} removed",
        src,
        dst,
        report.copied,
        report.removed
    );
    Ok(report)
}

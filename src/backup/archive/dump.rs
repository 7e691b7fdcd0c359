use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::result_error::result::Result;
use dyn_iter::{DynIter, IntoDynIterator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A database dump that has already been written to disk by the export tool.
///
/// The dump is archived under `DB/` and removed afterwards.
#[derive(Debug, Clone)]
pub struct DumpFileSource {
    src: Arc<Path>,
    dst: Arc<Path>,
}

impl DumpFileSource {
    pub fn new<P: AsRef<Path>>(dump: P) -> Self {
        let dump = dump.as_ref();
        let dst = PathBuf::from("DB").join(dump.file_name().unwrap_or_default());
        Self {
            src: dump.into(),
            dst: dst.into(),
        }
    }
}

impl ArchiveEntryIterable for DumpFileSource {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.src.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database dump {:?} was not written", self.src),
            )
            .into());
        }
        Ok(std::iter::once(Ok(ArchiveEntry::delete_src(self.src.clone(), self.dst.clone())))
            .into_dyn_iter())
    }
}

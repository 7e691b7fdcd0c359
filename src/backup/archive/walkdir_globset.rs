use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};

use bon::Builder;
use derive_more::{Display, From};
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use walkdir::{DirEntry, WalkDir};

use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use std::result;
use std::str::FromStr;

/// The site tree of a WordPress install, as it goes into a `Files-` archive.
///
/// Walks `src_dir` and yields every directory and file under it, re-rooted
/// at `dst_dir`. Paths matching one of the `exclude` globs (relative to
/// `src_dir`) are skipped together with their subtree, and files larger than
/// `max_size` bytes are left out.
#[derive(Clone, Debug, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SiteFilesSource {
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(default = PathBuf::from("Files"), into)]
    dst_dir: PathBuf,
    #[builder(default)]
    exclude: Vec<CustomDeserializedGlob>,
    max_size: Option<u64>,
}

/// A glob pattern parsed with literal separators, so `*` never crosses `/`.
#[derive(Clone, Debug, From, Display, Serialize, Builder, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    #[builder(into)]
    glob: Glob,
}

impl FromStr for CustomDeserializedGlob {
    type Err = globset::Error;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        GlobBuilder::new(s.trim())
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

impl SiteFilesSource {
    fn build_globset(&self) -> Result<GlobSet> {
        let mut globset = GlobSetBuilder::new();
        self.exclude.iter().for_each(|g| {
            globset.add(g.glob.clone());
        });
        Ok(globset.build()?)
    }
}

impl ArchiveEntryIterable for SiteFilesSource {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.src_dir.is_dir() {
            tracing::error!(
                "Site directory does not exist or is not a directory: {:?}",
                self.src_dir
            );
            return Err(Error::from(std::io::Error::other(format!(
                "{:?} is not a directory",
                self.src_dir
            )))
            .add_fn_name(function_path!()));
        }

        tracing::info!(
            "Starting site scan: {:?} with {} exclude patterns, max file size {:?}",
            self.src_dir,
            self.exclude.len(),
            self.max_size
        );

        let filter_globset = self.build_globset().add_fn_name(function_path!())?;
        let filter_src_dir = self.src_dir.clone();
        let src_dir = self.src_dir.clone();
        let dst_dir = self.dst_dir.clone();
        let max_size = self.max_size;

        let entries = WalkDir::new(&self.src_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |de| !is_excluded(de, &filter_src_dir, &filter_globset))
            .filter_map(move |res| match res {
                Ok(de) => process_dir_entry(de, &src_dir, &dst_dir, max_size),
                Err(e) => Some(Err(e.into())),
            })
            .map(move |res| res.add_fn_name(function_path!()));

        Ok(entries.into_dyn_iter())
    }
}

fn is_excluded(de: &DirEntry, base_src_dir: &Path, excluded: &GlobSet) -> bool {
    match de.path().strip_prefix(base_src_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() && excluded.is_match(rel) => {
            tracing::debug!("Excluding {:?}", de.path());
            true
        }
        _ => false,
    }
}

fn process_dir_entry<P1: AsRef<Path>, P2: AsRef<Path>>(
    de: DirEntry,
    base_src_dir: P1,
    base_dst_dir: P2,
    max_size: Option<u64>,
) -> Option<Result<ArchiveEntry>> {
    let p = de.into_path();
    if p.is_file() {
        if let Some(max_size) = max_size {
            match p.metadata() {
                Ok(md) if md.len() > max_size => {
                    tracing::debug!("Skipping {:?}, {} bytes exceeds {}", p, md.len(), max_size);
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(Error::from(e).add_msg(format!("Reading {:?}", p)))),
            }
        }
    } else if !p.is_dir() {
        tracing::trace!("Skipping {:?}, not a file or directory", p);
        return None;
    }

    let res = match p.strip_prefix(base_src_dir.as_ref()) {
        Ok(stripped_path) => Ok(base_dst_dir.as_ref().join(stripped_path)),
        Err(e) => Err(Error::from(e).add_msg(format!(
            "Stripping {:?} from {:?} failed",
            base_src_dir.as_ref(),
            p
        ))),
    };

    Some(res.map(|dst| {
        let entry = ArchiveEntry::keep_src(p, dst);
        tracing::trace!("Including: {:?} -> {:?}", entry.src, entry.dst);
        entry
    }))
}

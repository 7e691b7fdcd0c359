pub mod dump;
pub mod walkdir_globset;

use crate::backup::compress::{CompressorBuilder, CompressorConfig, Compressor};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use dyn_iter::DynIter;
use function_name::named;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, BufWriter, IntoInnerError};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Container format of a backup artifact, as named by `COMPRESSION_FORMAT`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    #[default]
    TarGz,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 3] =
        [ArchiveFormat::TarGz, ArchiveFormat::Tar, ArchiveFormat::Zip];

    pub fn compressor(&self) -> CompressorConfig {
        match self {
            ArchiveFormat::TarGz => CompressorConfig::Gzip,
            ArchiveFormat::Zip | ArchiveFormat::Tar => CompressorConfig::None,
        }
    }

    /// Detects the format from the file name. `.tgz` is accepted as `tar.gz`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::unsupported_format(path))?;
        Self::strip_ext(file_name)
            .map(|(_, format)| format)
            .ok_or_else(|| Error::unsupported_format(path))
    }

    /// Splits `name.<ext>` into `name` and the format `<ext>` denotes.
    pub fn strip_ext(file_name: &str) -> Option<(&str, Self)> {
        if let Some(stem) = file_name.strip_suffix(".tgz") {
            return Some((stem, ArchiveFormat::TarGz));
        }
        Self::ALL.iter().find_map(|format| {
            file_name
                .strip_suffix(format.file_ext()?)
                .and_then(|s| s.strip_suffix('.'))
                .map(|stem| (stem, *format))
        })
    }
}

impl FileExtProvider for ArchiveFormat {
    fn file_ext(&self) -> Option<&'static str> {
        Some(match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        })
    }
}

impl Display for ArchiveFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_ext().unwrap_or_default())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "tar.gz" | "tgz" | "targz" => Ok(ArchiveFormat::TarGz),
            other => Err(format!(
                "unsupported compression format {other:?}, expected zip, tar or tar.gz"
            )),
        }
    }
}

/// A single file or directory to put into an archive.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub src: Arc<Path>,
    /// Path inside the archive.
    pub dst: Arc<Path>,
    /// Remove `src` once it has been written, for temporary files such as dumps.
    pub delete_src: bool,
}

impl ArchiveEntry {
    fn new<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B, delete_src: bool) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            delete_src,
        }
    }

    pub fn keep_src<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B) -> Self {
        Self::new(src, dst, false)
    }

    pub fn delete_src<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B) -> Self {
        Self::new(src, dst, true)
    }
}

/// Sources that can enumerate the entries of an archive.
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}

pub enum ArchiveWriter {
    Tar(tar::Builder<Compressor<BufWriter<File>>>),
    Zip(ZipWriter<BufWriter<File>>),
}

impl ArchiveWriter {
    pub fn new(format: ArchiveFormat, file: File) -> Result<Self> {
        let writer = BufWriter::new(file);
        Ok(match format {
            ArchiveFormat::Zip => ArchiveWriter::Zip(ZipWriter::new(writer)),
            ArchiveFormat::Tar | ArchiveFormat::TarGz => {
                let mut builder = tar::Builder::new(format.compressor().build_compressor(writer)?);
                builder.follow_symlinks(true);
                ArchiveWriter::Tar(builder)
            }
        })
    }

    pub fn append(&mut self, entry: &ArchiveEntry) -> Result<()> {
        match self {
            ArchiveWriter::Tar(builder) => {
                builder.append_path_with_name(&entry.src, &entry.dst)?;
            }
            ArchiveWriter::Zip(zip) => {
                let metadata = std::fs::metadata(&entry.src)?;
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .unix_permissions(metadata.permissions().mode())
                    .large_file(metadata.len() > u32::MAX as u64);
                let name = zip_entry_name(&entry.dst);
                if metadata.is_dir() {
                    zip.add_directory(name, options)?;
                } else {
                    zip.start_file(name, options)?;
                    std::io::copy(&mut BufReader::new(File::open(&entry.src)?), zip)?;
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let file = match self {
            ArchiveWriter::Tar(builder) => builder
                .into_inner()?
                .finish()?
                .into_inner()
                .map_err(IntoInnerError::into_error)?,
            ArchiveWriter::Zip(zip) => zip
                .finish()?
                .into_inner()
                .map_err(IntoInnerError::into_error)?,
        };
        file.sync_all()?;
        Ok(())
    }
}

fn zip_entry_name(dst: &Path) -> String {
    dst.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn tmp_path(out_path: &Path) -> PathBuf {
    let mut name = out_path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    out_path.with_file_name(name)
}

/// Writes every entry of `source` into a new archive at `out_path`.
///
/// The archive is built under a `.tmp` name and renamed once complete. An
/// existing `out_path` is never overwritten. Entries that fail to enumerate
/// are skipped and returned as the non fatal error.
#[named]
pub fn create_archive<S: ArchiveEntryIterable + ?Sized>(
    format: ArchiveFormat,
    out_path: &Path,
    source: &S,
) -> Result<Option<Error>> {
    if out_path.exists() {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("archive {:?} already exists", out_path),
        ))
        .add_fn_name(function_path!()));
    }

    let file_path_tmp = tmp_path(out_path);
    let mut skipped = Vec::new();
    let write_res = (|| -> Result<usize> {
        let mut writer = ArchiveWriter::new(format, File::create_new(&file_path_tmp)?)?;
        let mut count = 0;
        for entry in source.archive_entry_iterator()? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Ignoring entry: {e}");
                    skipped.push(e);
                    continue;
                }
            };
            writer
                .append(&entry)
                .add_msg(format!("Appending {:?} as {:?}", entry.src, entry.dst))?;
            if entry.delete_src {
                std::fs::remove_file(&entry.src)?;
            }
            count += 1;
        }
        writer.finish()?;
        Ok(count)
    })();

    let res = write_res
        .and_then(|count| {
            std::fs::rename(&file_path_tmp, out_path)?;
            tracing::info!("Wrote {} entries to {:?}", count, out_path);
            Ok(())
        })
        .map_err(|mut e| {
            if file_path_tmp.exists() {
                if let Err(e2) = std::fs::remove_file(&file_path_tmp) {
                    e = e.chain(Error::from(e2).add_msg("Delete tmp file failed"));
                }
            }
            e
        })
        .add_fn_name(function_path!());

    res.map(|_| convert_error_vec(skipped).err())
}

/// Unpacks `archive` into `dest_dir`, detecting the format from its name.
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<ArchiveFormat> {
    let format = ArchiveFormat::from_path(archive)?;
    std::fs::create_dir_all(dest_dir)?;
    let file = BufReader::new(File::open(archive)?);
    match format {
        ArchiveFormat::Zip => ZipArchive::new(file)?.extract(dest_dir)?,
        ArchiveFormat::Tar | ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(format.compressor().build_decompressor(file));
            tar.set_preserve_permissions(true);
            tar.set_overwrite(true);
            tar.unpack(dest_dir)?
        }
    }
    tracing::debug!("Extracted {:?} ({}) into {:?}", archive, format, dest_dir);
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyn_iter::IntoDynIterator;
    use tempfile::TempDir;

    struct EntryList(Vec<(PathBuf, PathBuf)>);

    impl ArchiveEntryIterable for EntryList {
        fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
            Ok(self
                .0
                .clone()
                .into_iter()
                .map(|(src, dst)| Ok(ArchiveEntry::keep_src(src, dst)))
                .into_dyn_iter())
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ArchiveFormat::from_path("Files-20240101-000000.zip").unwrap(),
            ArchiveFormat::Zip
        );
        assert_eq!(ArchiveFormat::from_path("/b/Files-1.tar.gz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_path("Files-1.tgz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_path("Files-1.tar").unwrap(), ArchiveFormat::Tar);
        let err = ArchiveFormat::from_path("Files-1.rar").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("tar.gz".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert_eq!(" ZIP ".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert!("7z".parse::<ArchiveFormat>().is_err());
        assert_eq!(ArchiveFormat::TarGz.to_string(), "tar.gz");
    }

    #[test]
    fn test_strip_ext_prefers_tar_gz() {
        assert_eq!(
            ArchiveFormat::strip_ext("Files-1.tar.gz"),
            Some(("Files-1", ArchiveFormat::TarGz))
        );
        assert_eq!(ArchiveFormat::strip_ext("Files-1.tar"), Some(("Files-1", ArchiveFormat::Tar)));
        assert_eq!(ArchiveFormat::strip_ext("Files-1zip"), None);
    }

    #[test]
    fn test_create_and_extract_each_format() {
        for format in ArchiveFormat::ALL {
            let temp_dir = TempDir::new().unwrap();
            let site = temp_dir.path().join("site");
            std::fs::create_dir_all(site.join("wp-content")).unwrap();
            std::fs::write(site.join("wp-content/index.php"), "<?php").unwrap();

            let source = EntryList(vec![
                (site.clone(), PathBuf::from("Files")),
                (site.join("wp-content"), PathBuf::from("Files/wp-content")),
                (site.join("wp-content/index.php"), PathBuf::from("Files/wp-content/index.php")),
            ]);
            let out = temp_dir.path().join(format!("Files-1.{format}"));
            let skipped = create_archive(format, &out, &source).unwrap();
            assert!(skipped.is_none());
            assert!(out.is_file());
            assert!(!tmp_path(&out).exists());

            let dest = temp_dir.path().join("out");
            assert_eq!(extract_archive(&out, &dest).unwrap(), format);
            assert_eq!(
                std::fs::read_to_string(dest.join("Files/wp-content/index.php")).unwrap(),
                "<?php"
            );
        }
    }

    #[test]
    fn test_create_archive_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("Files-1.tar");
        std::fs::write(&out, "first run").unwrap();

        let res = create_archive(ArchiveFormat::Tar, &out, &EntryList(vec![]));
        assert!(res.is_err());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "first run");
    }

    #[test]
    fn test_failed_archive_removes_tmp() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("Files-1.zip");
        let source = EntryList(vec![(
            temp_dir.path().join("missing"),
            PathBuf::from("Files/missing"),
        )]);

        assert!(create_archive(ArchiveFormat::Zip, &out, &source).is_err());
        assert!(!out.exists());
        assert!(!tmp_path(&out).exists());
    }
}

//! Resolving which artifacts a restore uses.

use crate::backup::artifact::{latest_in_dir, list_artifacts, Artifact, ArtifactKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::io::{BufRead, Write};
use std::path::Path;

/// What a restore is allowed to touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wanted {
    pub db: bool,
    pub files: bool,
}

impl Wanted {
    pub fn wants(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Db => self.db,
            ArtifactKind::Files => self.files,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub db: Option<Artifact>,
    pub files: Option<Artifact>,
}

impl Selection {
    fn set(&mut self, artifact: Artifact) {
        match artifact.kind() {
            ArtifactKind::Db => self.db = Some(artifact),
            ArtifactKind::Files => self.files = Some(artifact),
        }
    }
}

/// Classifies an explicitly given file, or picks the newest artifact of
/// each wanted kind from an explicitly given directory.
pub fn from_source(source: &Path, wanted: Wanted) -> Result<Selection> {
    let mut selection = Selection::default();
    if source.is_dir() {
        for kind in [ArtifactKind::Db, ArtifactKind::Files] {
            if !wanted.wants(kind) {
                continue;
            }
            match latest_in_dir(source, kind)? {
                Some(artifact) => selection.set(artifact),
                None => tracing::info!("No {} backup in {:?}", kind, source),
            }
        }
    } else if source.is_file() {
        let artifact = Artifact::from_explicit_path(source)?;
        if wanted.wants(artifact.kind()) {
            selection.set(artifact);
        } else {
            tracing::info!(
                "Ignoring {:?}, {} restore is disabled",
                source,
                artifact.kind()
            );
        }
    } else {
        return Err(Error::invalid_selection(format!(
            "{:?} does not exist",
            source
        )));
    }
    Ok(selection)
}

/// Prints the artifacts in `backup_dir`, newest first, and asks for one
/// number per wanted kind. A blank answer skips that kind.
pub fn interactive<R: BufRead, W: Write>(
    backup_dir: &Path,
    wanted: Wanted,
    input: &mut R,
    output: &mut W,
) -> Result<Selection> {
    let artifacts = list_artifacts(backup_dir)?;
    let mut selection = Selection::default();
    if artifacts.is_empty() {
        writeln!(output, "No backups found in {:?}", backup_dir)?;
        return Ok(selection);
    }

    writeln!(output, "Backups in {:?}:", backup_dir)?;
    for (i, artifact) in artifacts.iter().enumerate() {
        writeln!(output, "  {:>3}) {}", i + 1, artifact.file_name_str())?;
    }

    for kind in [ArtifactKind::Db, ArtifactKind::Files] {
        if !wanted.wants(kind) {
            continue;
        }
        write!(output, "{} backup number (blank to skip): ", kind)?;
        output.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        let answer = answer.trim();
        if answer.is_empty() {
            continue;
        }

        let artifact = answer
            .parse::<usize>()
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| artifacts.get(i))
            .ok_or_else(|| Error::invalid_selection(format!("{answer:?} is not a listed number")))?;
        if artifact.kind() != kind {
            return Err(Error::invalid_selection(format!(
                "{} is not a {} backup",
                artifact.file_name_str(),
                kind
            )));
        }
        selection.set(artifact.clone());
    }
    Ok(selection)
}

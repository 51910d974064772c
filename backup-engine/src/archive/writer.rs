//! Archive creation.
//!
//! Directory sources are stored under `<base name>/<relative path>`, file
//! sources under their bare file name. The archive being written is never
//! added to itself.

use crate::error::EngineError;
use crate::fs::walker::{absolute_lexical, walk_files, WalkOptions};
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries above this size need ZIP64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// What went into an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes: u64,
}

/// Build `destination` from `sources`, in the order given.
///
/// Any I/O failure aborts the whole operation. A partially written archive
/// is left on disk for the caller to deal with.
pub fn create_archive(sources: &[PathBuf], destination: &Path) -> Result<ArchiveSummary> {
    let file = File::create(destination).map_err(|e| {
        EngineError::ArchiveIo(format!("create {}: {}", destination.display(), e))
    })?;
    // Resolved once, after the file exists; every comparison below uses this value.
    let destination_abs = destination.canonicalize().map_err(EngineError::archive)?;

    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut summary = ArchiveSummary::default();

    for source in sources {
        let source_abs = source.canonicalize().map_err(|e| {
            EngineError::ArchiveIo(format!("resolve {}: {}", source.display(), e))
        })?;

        if source_abs.is_dir() {
            let base_name = base_name(source);
            let options = WalkOptions::excluding(&destination_abs);
            walk_files(&source_abs, &options, |file| {
                let name = format!("{}/{}", base_name, file.relative_posix());
                add_file(&mut zip, &file.path, &name, file.size)?;
                summary.entries += 1;
                summary.bytes += file.size;
                Ok(())
            })
            .map_err(|e| EngineError::ArchiveIo(format!("archive {}: {}", source.display(), e)))?;
            debug!(source = %source_abs.display(), "Archived directory");
        } else {
            if source_abs == destination_abs {
                debug!(source = %source_abs.display(), "Skipping the archive itself");
                continue;
            }
            let name = base_name(source);
            let size = std::fs::metadata(&source_abs).map_err(EngineError::archive)?.len();
            add_file(&mut zip, &source_abs, &name, size)
                .map_err(|e| EngineError::ArchiveIo(format!("archive {}: {}", source.display(), e)))?;
            summary.entries += 1;
            summary.bytes += size;
            debug!(source = %source_abs.display(), "Archived file");
        }
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(EngineError::archive)?;

    info!(
        archive = %destination.display(),
        entries = summary.entries,
        bytes = summary.bytes,
        "Archive written"
    );
    Ok(summary)
}

/// Last component of the normalized source path, `root` when there is none
/// (e.g. `/`). `photos/sub/..` names `photos`.
fn base_name(source: &Path) -> String {
    absolute_lexical(source)
        .components()
        .next_back()
        .and_then(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap_or_else(|| "root".to_string())
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    size: u64,
) -> std::io::Result<()> {
    let mut options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= ZIP64_THRESHOLD);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
        }
    }

    zip.start_file(name, options).map_err(std::io::Error::other)?;
    let mut input = File::open(path)?;
    std::io::copy(&mut input, zip)?;
    Ok(())
}

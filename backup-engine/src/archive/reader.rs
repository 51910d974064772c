//! Archive listing and extraction.

use crate::archive::selection::normalize_member;
use crate::Result;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

/// What an extraction wrote to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

fn open(archive: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(archive)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Member names in archive order, `/`-separated.
pub fn list_members(archive: &Path) -> Result<Vec<String>> {
    let mut zip = open(archive)?;
    let mut members = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        members.push(normalize_member(entry.name()));
    }
    Ok(members)
}

/// Extract every member into `destination`.
pub fn extract_all(archive: &Path, destination: &Path) -> Result<ExtractSummary> {
    extract_matching(archive, destination, |_| true)
}

/// Extract the members accepted by `filter` into `destination`.
///
/// Members whose names would escape `destination` are skipped. Existing
/// files are overwritten.
pub fn extract_matching<F>(archive: &Path, destination: &Path, filter: F) -> Result<ExtractSummary>
where
    F: Fn(&str) -> bool,
{
    let mut zip = open(archive)?;
    let mut summary = ExtractSummary::default();
    fs::create_dir_all(destination)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = normalize_member(entry.name());
        if !filter(&name) {
            continue;
        }

        let outpath = match entry.enclosed_name() {
            Some(path) => destination.join(path),
            None => {
                warn!(member = %name, "Skipping member with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&outpath)?;
        summary.bytes += std::io::copy(&mut entry, &mut output)?;
        summary.files += 1;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))?;
        }

        debug!(member = %name, path = %outpath.display(), "Extracted");
    }

    Ok(summary)
}

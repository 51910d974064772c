//! Streaming file digests and directory manifests.

use crate::error::EngineError;
use crate::fs::walker::{walk_files, WalkOptions};
use crate::manifest::{Manifest, ManifestEntry};
use crate::Result;
use sha2::digest::DynDigest;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error};

pub const DEFAULT_ALGORITHM: &str = "sha256";

/// Read buffer size used while hashing (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

fn hasher_for(algorithm: &str) -> Result<Box<dyn DynDigest>> {
    let hasher: Box<dyn DynDigest> = match algorithm.trim().to_ascii_lowercase().as_str() {
        "sha256" => Box::new(sha2::Sha256::default()),
        "sha224" => Box::new(sha2::Sha224::default()),
        "sha384" => Box::new(sha2::Sha384::default()),
        "sha512" => Box::new(sha2::Sha512::default()),
        "sha1" => Box::new(sha1::Sha1::default()),
        other => return Err(EngineError::UnsupportedAlgorithm(other.to_string())),
    };
    Ok(hasher)
}

/// Hash `path` in fixed-size chunks and return the lowercase hex digest.
pub fn compute_digest(path: &Path, algorithm: &str, chunk_size: usize) -> Result<String> {
    if !path.exists() {
        error!(path = %path.display(), "File to hash does not exist");
        return Err(EngineError::NotFound(path.to_path_buf()));
    }
    let mut hasher = hasher_for(algorithm)?;

    debug!(path = %path.display(), algorithm, "Computing digest");
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let digest = hex::encode(hasher.finalize());
    debug!(path = %path.display(), algorithm, %digest, "Digest computed");
    Ok(digest)
}

/// SHA-256 of `path` with the default chunk size.
pub fn sha256_file(path: &Path) -> Result<String> {
    compute_digest(path, DEFAULT_ALGORITHM, DEFAULT_CHUNK_SIZE)
}

/// Recompute the digest of `path` and compare it case-insensitively.
///
/// Any failure to compute the digest counts as a mismatch.
pub fn verify_digest(path: &Path, expected: &str, algorithm: &str) -> bool {
    let actual = match compute_digest(path, algorithm, DEFAULT_CHUNK_SIZE) {
        Ok(actual) => actual,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Digest verification could not run");
            return false;
        }
    };
    let ok = actual.eq_ignore_ascii_case(expected.trim());
    if ok {
        debug!(path = %path.display(), "Checksum OK");
    } else {
        error!(path = %path.display(), %actual, expected, "Checksum mismatch");
    }
    ok
}

/// Hash every regular file under `dir`, keyed by its POSIX relative path.
///
/// Files that cannot be hashed are logged and left out of the manifest.
pub fn build_manifest(dir: &Path, algorithm: &str) -> Result<Manifest> {
    if !dir.is_dir() {
        error!(path = %dir.display(), "Manifest source is not a directory");
        return Err(EngineError::NotADirectory(dir.to_path_buf()));
    }
    // Fail fast on an unknown algorithm instead of skipping every file.
    hasher_for(algorithm)?;

    let mut manifest = Manifest::new();
    walk_files(dir, &WalkOptions::default(), |file| {
        match compute_digest(&file.path, algorithm, DEFAULT_CHUNK_SIZE) {
            Ok(hash) => {
                manifest.insert(
                    file.relative_posix(),
                    ManifestEntry {
                        hash,
                        size: file.size,
                    },
                );
            }
            Err(e) => error!(path = %file.path.display(), error = %e, "Skipped file in manifest"),
        }
        Ok(())
    })?;

    debug!(path = %dir.display(), files = manifest.len(), "Manifest built");
    Ok(manifest)
}

/// A manifest entry that no longer matches the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestViolation {
    Missing(String),
    Mismatch(String),
}

/// Check every manifest entry against `dir` and return all violations.
pub fn manifest_violations(dir: &Path, manifest: &Manifest, algorithm: &str) -> Vec<ManifestViolation> {
    let mut violations = Vec::new();
    for (relative, entry) in manifest.iter() {
        let full = dir.join(relative);
        if !full.is_file() {
            error!(path = %full.display(), "Manifest file missing");
            violations.push(ManifestViolation::Missing(relative.clone()));
            continue;
        }
        if !verify_digest(&full, &entry.hash, algorithm) {
            violations.push(ManifestViolation::Mismatch(relative.clone()));
        }
    }
    violations
}

/// True when every manifest entry exists under `dir` with a matching hash.
pub fn verify_manifest(dir: &Path, manifest: &Manifest, algorithm: &str) -> bool {
    manifest_violations(dir, manifest, algorithm).is_empty()
}

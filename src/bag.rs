//! BagIt-style payload manifest for a LiPD working directory.
//!
//! `save` records a SHA-256 digest for the metadata file and every CSV file in
//! `manifest-sha256.txt`, one `"{digest}  {filename}"` line per file, plus a
//! small `bag-info.txt`. `load` re-hashes the listed files and reports
//! mismatches as diagnostics.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

pub const MANIFEST_FILE: &str = "manifest-sha256.txt";
pub const BAG_INFO_FILE: &str = "bag-info.txt";

pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    let mut hex = String::with_capacity(64);
    for byte in hash.iter() {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Hashing {path:?}"))?;
    Ok(sha256_hex(&bytes))
}

/// Writes the manifest and bag info for `files` (names relative to `dir`).
pub fn write_manifest(dir: &Path, files: &[String]) -> Result<()> {
    let mut manifest = String::new();
    let mut total_bytes = 0u64;
    for name in files {
        let path = dir.join(name);
        let bytes = fs::read(&path).with_context(|| format!("Hashing {path:?}"))?;
        total_bytes += bytes.len() as u64;
        manifest.push_str(&format!("{}  {name}\n", sha256_hex(&bytes)));
    }
    fs::write(dir.join(MANIFEST_FILE), manifest)
        .with_context(|| format!("Writing {MANIFEST_FILE} in {dir:?}"))?;

    let info = format!(
        "Bagging-Date: {}\nPayload-Oxum: {total_bytes}.{}\n",
        Utc::now().format("%Y-%m-%d"),
        files.len()
    );
    fs::write(dir.join(BAG_INFO_FILE), info)
        .with_context(|| format!("Writing {BAG_INFO_FILE} in {dir:?}"))?;
    debug!("Recorded {} checksum(s) in {dir:?}", files.len());
    Ok(())
}

/// Checks every manifest entry. A directory without a manifest verifies
/// clean; I/O problems and mismatches come back as `MalformedInput`.
pub fn verify_manifest(dir: &Path) -> Vec<CoreError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let Ok(manifest) = fs::read_to_string(&manifest_path) else {
        debug!("No {MANIFEST_FILE} in {dir:?}; skipping verification");
        return Vec::new();
    };
    let mut issues = Vec::new();
    let mut checked = 0usize;
    for (line_no, line) in manifest.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let Some((expected, name)) = line.split_once(char::is_whitespace) else {
            issues.push(CoreError::malformed(
                format!("{MANIFEST_FILE}:{}", line_no + 1),
                "expected '<digest>  <file>'",
            ));
            continue;
        };
        let name = name.trim_start();
        match file_digest(&dir.join(name)) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => checked += 1,
            Ok(actual) => issues.push(CoreError::malformed(
                name,
                format!("checksum mismatch (manifest {expected}, file {actual})"),
            )),
            Err(err) => issues.push(CoreError::malformed(name, format!("{err:#}"))),
        }
    }
    if issues.is_empty() {
        info!("Verified {checked} checksum(s) in {dir:?}");
    }
    issues
}

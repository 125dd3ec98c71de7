// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! `CAIssuer` (§4.2): process-wide mutual exclusion around CA signing,
//! plus the monotonic on-disk serial counter.
//!
//! The teacher never needed cross-process exclusion — `oca` owns the
//! sqlite file outright for the duration of one CLI invocation. Here
//! multiple front-daemon workers (§5) can race to sign at once, so the
//! critical section is fenced with an `fs2` advisory lock on
//! `<confdir>/db/serial.lock`, the way a PID-file-style daemon would.
//! A lock that's already held surfaces as `NivlheimError::Busy`, never
//! a blocking wait — callers are expected to retry.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::config::Confdir;
use crate::error::NivlheimError;
use crate::x509::{self, CaIdentity};

pub struct CaIssuer {
    confdir: Confdir,
    ca: CaIdentity,
}

impl CaIssuer {
    /// Load the CA identity from `<confdir>/CA`, generating a fresh
    /// self-signed one on first run.
    pub fn open(confdir: Confdir) -> Result<Self> {
        confdir.ensure_layout()?;

        let key_path = confdir.ca_dir().join("ca.key");
        let cert_path = confdir.ca_dir().join("ca.pem");

        let ca = if key_path.exists() && cert_path.exists() {
            let key_pem = std::fs::read(&key_path)
                .with_context(|| format!("reading {}", key_path.display()))?;
            let cert_pem = std::fs::read(&cert_path)
                .with_context(|| format!("reading {}", cert_path.display()))?;
            CaIdentity::from_pem(&key_pem, &cert_pem)?
        } else {
            let ca = CaIdentity::generate("Nivlheim CA")?;
            std::fs::write(&key_path, ca.key.private_key_to_pem_pkcs8()?)
                .with_context(|| format!("writing {}", key_path.display()))?;
            std::fs::write(&cert_path, ca.cert.to_pem()?)
                .with_context(|| format!("writing {}", cert_path.display()))?;
            ca
        };

        Ok(Self { confdir, ca })
    }

    pub fn ca_cert_pem(&self) -> Result<Vec<u8>> {
        Ok(self.ca.cert.to_pem()?)
    }

    /// `GenerateKeyAndCSR` → `Sign`, under the process-wide lock. Returns
    /// `(cert_pem, der, key_pem)`.
    pub fn issue(&self, common_name: &str) -> Result<(String, Vec<u8>, String), NivlheimError> {
        let (key_pem, csr_pem) = x509::generate_key_and_csr(common_name).map_err(NivlheimError::from)?;

        let lock = self.acquire_lock()?;

        let serial = self.next_serial().map_err(NivlheimError::from)?;
        let result = x509::sign_csr(&self.ca, &csr_pem, common_name, serial);

        drop(lock);

        let (cert_pem, der) = result.map_err(NivlheimError::from)?;
        Ok((cert_pem, der, key_pem))
    }

    fn acquire_lock(&self) -> Result<File, NivlheimError> {
        let path = self.confdir.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| NivlheimError::internal(format!("opening {}: {e}", path.display())))?;

        file.try_lock_exclusive().map_err(|_| {
            NivlheimError::Busy("certificate authority is signing another request".into())
        })?;

        Ok(file)
    }

    /// Read, increment and persist `<confdir>/db/serial`. Starts at 1.
    fn next_serial(&self) -> Result<u64> {
        let path = self.confdir.serial_path();

        let current: u64 = if path.exists() {
            let mut buf = String::new();
            File::open(&path)
                .with_context(|| format!("opening {}", path.display()))?
                .read_to_string(&mut buf)
                .with_context(|| format!("reading {}", path.display()))?;
            buf.trim().parse().context("serial counter file is corrupt")?
        } else {
            0
        };

        let next = current + 1;

        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        write!(f, "{next}").context("persisting serial counter")?;
        f.sync_all().ok();

        Ok(next)
    }
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tempfile::TempDir;

use nivlheim_lib::certstore::CertStore;
use nivlheim_lib::db::Db;
use nivlheim_lib::x509::{self, CaIdentity};

static SERIAL: AtomicU64 = AtomicU64::new(1);

/// A fresh sqlite-backed `CertStore` in a throwaway directory, migrated
/// and ready to use.
pub fn temp_store() -> Result<(TempDir, CertStore)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("nivlheim.sqlite");
    let db = Db::new(db_path.to_str().unwrap())?;
    Ok((dir, CertStore::new(db)))
}

pub fn test_ca() -> CaIdentity {
    CaIdentity::generate("Test CA").expect("generating test CA")
}

/// Issue a certificate for `common_name` under `ca`, without going
/// through `CaIssuer`'s file lock (tests don't need cross-process
/// exclusion — this is the bare `GenerateKeyAndCSR → Sign` sequence).
pub fn issue(ca: &CaIdentity, common_name: &str) -> (String, Vec<u8>, String) {
    let (key_pem, csr_pem) = x509::generate_key_and_csr(common_name).expect("csr generation");
    let serial = SERIAL.fetch_add(1, Ordering::SeqCst);
    let (cert_pem, der) = x509::sign_csr(ca, &csr_pem, common_name, serial).expect("signing");
    (cert_pem, der, key_pem)
}

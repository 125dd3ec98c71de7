// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! `SessionGuard` — the `ping`-time policy (§4.4). Short-circuiting
//! checks in a fixed order, same shape as the teacher's certificate
//! validity checks in `pgp.rs` but evaluated for X.509 expiry/revocation
//! instead of a PGP key's binding signatures.

use chrono::{DateTime, Utc};

use crate::certstore::CertStore;
use crate::error::NivlheimError;
use crate::x509;

const RENEWAL_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Ok,
}

pub struct SessionGuard<'a> {
    store: &'a CertStore,
}

impl<'a> SessionGuard<'a> {
    pub fn new(store: &'a CertStore) -> Self {
        Self { store }
    }

    /// Evaluate the `ping` policy for a presented client certificate.
    /// `peer_cert_pem` and `not_after` are supplied by the front server
    /// per §6's contract; checks run in the order §4.4 specifies and the
    /// first failing one short-circuits (§7).
    pub fn ping(
        &self,
        peer_cert_pem: &[u8],
        not_after: DateTime<Utc>,
    ) -> Result<PingOutcome, NivlheimError> {
        let remaining = not_after - Utc::now();
        if remaining < chrono::Duration::days(RENEWAL_WINDOW_DAYS) {
            return Err(NivlheimError::Forbidden(
                "certificate about to expire, please renew".into(),
            ));
        }

        let der = x509::der_of_pem_cert(std::str::from_utf8(peer_cert_pem).map_err(|e| {
            NivlheimError::BadRequest(format!("peer certificate is not valid PEM text: {e}"))
        })?)
        .map_err(NivlheimError::from)?;
        let fp = x509::fingerprint_sha1_hex(&der);

        let cert = self
            .store
            .lookup_by_fingerprint(&fp)
            .map_err(NivlheimError::from)?
            .ok_or_else(|| NivlheimError::Forbidden("unknown certificate".into()))?;

        if cert.revoked {
            return Err(NivlheimError::Forbidden("revoked".into()));
        }

        if let Some(hostinfo) = self.store.hostinfo_by_certfp(&fp).map_err(NivlheimError::from)? {
            if hostinfo.os_hostname != cert.common_name {
                return Err(NivlheimError::Forbidden(
                    "please renew your certificate".into(),
                ));
            }
        }

        Ok(PingOutcome::Ok)
    }
}

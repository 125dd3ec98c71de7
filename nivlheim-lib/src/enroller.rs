// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! `Enroller` (§4.3): `reqcert` and `renewcert`, coordinating CertStore,
//! CAIssuer and DNS. Grounded in shape on the teacher's user-enrollment
//! flow in `ca.rs` (look up or create, then drive signing), generalized
//! to the IP-range/waiting-list state machine this spec adds.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use tracing::{info, warn};

use crate::caissuer::CaIssuer;
use crate::certstore::{CertStore, NewIssuedCert};
use crate::dns::{FcrdnsResolver, FcrdnsResult};
use crate::error::NivlheimError;
use crate::x509;

/// The PEM/P12 bundle returned to the client on a successful issuance
/// (§6, "Response framing for enrollment").
pub struct IssuedBundle {
    pub cert_pem: String,
    pub key_pem: String,
    pub pkcs12_framed: String,
}

/// Outcome of `reqcert` when no certificate is issued yet.
pub enum ReqcertOutcome {
    Issued(IssuedBundle),
    AddedToWaitingList,
    Pending,
}

pub struct Enroller<'a> {
    store: &'a CertStore,
    issuer: &'a CaIssuer,
    resolver: &'a FcrdnsResolver,
}

impl<'a> Enroller<'a> {
    pub fn new(store: &'a CertStore, issuer: &'a CaIssuer, resolver: &'a FcrdnsResolver) -> Self {
        Self { store, issuer, resolver }
    }

    fn in_auto_approve_range(&self, ip: IpAddr) -> Result<bool, NivlheimError> {
        let ranges = self.store.ipranges().map_err(NivlheimError::from)?;
        for cidr in ranges {
            if let Ok(net) = IpNet::from_str(&cidr) {
                if net.contains(&ip) {
                    return Ok(true);
                }
            } else {
                warn!(cidr = %cidr, "ignoring unparsable IP range");
            }
        }
        Ok(false)
    }

    fn resolve_hostname(&self, ip: IpAddr, fallback: Option<&str>) -> Result<String, NivlheimError> {
        if let FcrdnsResult::Confirmed { hostname } = self.resolver.check(ip) {
            return Ok(hostname);
        }

        fallback
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| NivlheimError::BadRequest("hostname is required".into()))
    }

    /// `reqcert(peerIP, params)` (§4.3).
    pub fn reqcert(&self, peer_ip: IpAddr, hostname_param: Option<&str>) -> Result<ReqcertOutcome, NivlheimError> {
        let ip_str = peer_ip.to_string();

        let hostname = if self.in_auto_approve_range(peer_ip)? {
            self.resolve_hostname(peer_ip, hostname_param)?
        } else {
            match self.store.waiting_lookup(&ip_str).map_err(NivlheimError::from)? {
                None => {
                    // §4.3 step 2 (Missing): params.hostname must be
                    // non-empty before anything else is consulted — FCrDNS
                    // may still override it below, but an empty param is
                    // rejected outright rather than silently queued.
                    let hostname_param = hostname_param
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| NivlheimError::BadRequest("hostname is required".into()))?;

                    let hostname = self.resolve_hostname(peer_ip, Some(hostname_param))?;
                    self.store
                        .waiting_insert(&ip_str, &hostname)
                        .map_err(NivlheimError::from)?;
                    info!(ip = %ip_str, hostname = %hostname, "added to waiting list");
                    return Ok(ReqcertOutcome::AddedToWaitingList);
                }
                Some(entry) if !entry.approved => {
                    return Ok(ReqcertOutcome::Pending);
                }
                Some(entry) => entry.hostname,
            }
        };

        let bundle = self.issue(&hostname, None, None)?;

        // Best-effort: a failure here is logged, not surfaced (§4.3 step 5 / §7).
        if let Err(e) = self.store.waiting_delete(&ip_str) {
            warn!(ip = %ip_str, error = %e, "failed to delete waiting-list entry after issuance");
        }

        Ok(ReqcertOutcome::Issued(bundle))
    }

    /// `renewcert(peerCert)` (§4.3), mTLS-authenticated by the front
    /// server; `peer_cert_pem` is the certificate it presented.
    pub fn renewcert(&self, peer_cert_pem: &[u8]) -> Result<IssuedBundle, NivlheimError> {
        let pem = std::str::from_utf8(peer_cert_pem)
            .map_err(|e| NivlheimError::BadRequest(format!("peer certificate is not valid PEM text: {e}")))?;
        let der = x509::der_of_pem_cert(pem).map_err(NivlheimError::from)?;
        let fp = x509::fingerprint_sha1_hex(&der);

        let existing = self
            .store
            .lookup_by_fingerprint(&fp)
            .map_err(NivlheimError::from)?
            .ok_or_else(|| NivlheimError::Forbidden("unknown certificate".into()))?;

        if existing.revoked {
            return Err(NivlheimError::Forbidden("revoked".into()));
        }

        let hostname = match self.store.hostinfo_by_certfp(&fp).map_err(NivlheimError::from)? {
            Some(hostinfo) => hostinfo.os_hostname,
            None => x509::common_name_of_pem_cert(peer_cert_pem)
                .map_err(NivlheimError::from)?
                .ok_or_else(|| NivlheimError::internal("unable to determine hostname"))?,
        };

        let bundle = self.issue(&hostname, Some(existing.certid), Some(existing.first))?;

        self.store
            .hostinfo_upsert_after_enroll(&fp, &new_fp_of(&bundle)?)
            .map_err(NivlheimError::from)?;

        Ok(bundle)
    }

    fn issue(
        &self,
        hostname: &str,
        previous: Option<i32>,
        first_of_chain: Option<i32>,
    ) -> Result<IssuedBundle, NivlheimError> {
        let (cert_pem, der, key_pem) = self.issuer.issue(hostname)?;
        let fp = x509::fingerprint_sha1_hex(&der);

        self.store
            .insert_issued(NewIssuedCert {
                fingerprint: &fp,
                common_name: hostname,
                previous,
                first_of_chain,
                cert_pem: &cert_pem,
            })
            .map_err(NivlheimError::from)?;

        let ca_cert_pem = self.issuer.ca_cert_pem().map_err(NivlheimError::from)?;
        let ca_cert = openssl::x509::X509::from_pem(&ca_cert_pem).map_err(|e| {
            NivlheimError::internal(format!("re-parsing CA certificate: {e}"))
        })?;

        let p12_der = x509::build_pkcs12(&cert_pem, &key_pem, &ca_cert).map_err(NivlheimError::from)?;
        let pkcs12_framed = x509::frame_pkcs12(&p12_der);

        Ok(IssuedBundle { cert_pem, key_pem, pkcs12_framed })
    }
}

fn new_fp_of(bundle: &IssuedBundle) -> Result<String, NivlheimError> {
    let der = x509::der_of_pem_cert(&bundle.cert_pem).map_err(NivlheimError::from)?;
    Ok(x509::fingerprint_sha1_hex(&der))
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Request guards for the metadata the front server injects (§6): peer
//! IP, peer certificate PEM and its `notAfter`. TLS termination and
//! client-cert presentation are an external collaborator's job per §1 —
//! this daemon only ever sees them as request headers.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::Request;

const HEADER_PEER_IP: &str = "X-Peer-Ip";
const HEADER_PEER_CERT: &str = "X-Peer-Cert";
const HEADER_PEER_CERT_NOT_AFTER: &str = "X-Peer-Cert-Not-After";

pub struct PeerIp(pub IpAddr);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PeerIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header_ip = req
            .headers()
            .get_one(HEADER_PEER_IP)
            .and_then(|s| s.parse::<IpAddr>().ok());

        match header_ip.or_else(|| req.client_ip()) {
            Some(ip) => Outcome::Success(PeerIp(ip)),
            None => Outcome::Error((Status::BadRequest, ())),
        }
    }
}

/// The client certificate the front server presented, as PEM text.
/// Headers can't carry literal newlines, so the front server is expected
/// to encode them as the two-character sequence `\n`; this guard
/// reverses that before handing the PEM on.
pub struct PeerCertPem(pub Vec<u8>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PeerCertPem {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one(HEADER_PEER_CERT) {
            Some(raw) => {
                let pem = raw.replace("\\n", "\n");
                Outcome::Success(PeerCertPem(pem.into_bytes()))
            }
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

pub struct PeerCertNotAfter(pub DateTime<Utc>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PeerCertNotAfter {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let parsed = req
            .headers()
            .get_one(HEADER_PEER_CERT_NOT_AFTER)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        match parsed {
            Some(not_after) => Outcome::Success(PeerCertNotAfter(not_after)),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// Guard satisfied only when the peer IP resolves to loopback — the
/// ingest worker route (§4.5, §6) must never be reachable from the
/// network.
pub struct LoopbackOnly;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for LoopbackOnly {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let PeerIp(ip) = match PeerIp::from_request(req).await {
            Outcome::Success(p) => p,
            _ => return Outcome::Error((Status::Forbidden, ())),
        };

        if ip.is_loopback() {
            Outcome::Success(LoopbackOnly)
        } else {
            Outcome::Error((Status::Forbidden, ()))
        }
    }
}

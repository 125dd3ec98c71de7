// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! The endpoints of §6's interface table, thin wrappers around
//! `Enroller`/`SessionGuard`/`Ingestor` — all the policy lives in
//! `nivlheim-lib`, this module only deals with request/response framing.

use chrono::Utc;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::{get, post, State};

use nivlheim_lib::dns::FcrdnsResolver;
use nivlheim_lib::enroller::{Enroller, IssuedBundle, ReqcertOutcome};
use nivlheim_lib::error::NivlheimError;
use nivlheim_lib::sessionguard::SessionGuard;
use nivlheim_lib::x509;

use crate::guards::{LoopbackOnly, PeerCertNotAfter, PeerCertPem, PeerIp};
use crate::responder::ApiError;
use crate::state::AppState;

fn render_bundle(b: &IssuedBundle) -> String {
    format!("{}\n{}\n{}", b.cert_pem, b.key_pem, b.pkcs12_framed)
}

#[get("/reqcert?<hostname>")]
pub fn reqcert(
    state: &State<AppState>,
    peer: PeerIp,
    hostname: Option<String>,
) -> Result<String, ApiError> {
    let resolver: &FcrdnsResolver = &state.resolver;
    let enroller = Enroller::new(&state.store, &state.issuer, resolver);

    match enroller.reqcert(peer.0, hostname.as_deref())? {
        ReqcertOutcome::Issued(bundle) => Ok(render_bundle(&bundle)),
        ReqcertOutcome::AddedToWaitingList => Ok("added to waiting list, please be patient".to_string()),
        ReqcertOutcome::Pending => Ok("be patient, your request is still awaiting approval".to_string()),
    }
}

#[get("/secure/renewcert")]
pub fn renewcert(state: &State<AppState>, peer_cert: PeerCertPem) -> Result<String, ApiError> {
    let resolver: &FcrdnsResolver = &state.resolver;
    let enroller = Enroller::new(&state.store, &state.issuer, resolver);
    let bundle = enroller.renewcert(&peer_cert.0)?;
    Ok(render_bundle(&bundle))
}

#[get("/secure/ping")]
pub fn ping(
    state: &State<AppState>,
    peer_cert: PeerCertPem,
    not_after: PeerCertNotAfter,
) -> Result<&'static str, ApiError> {
    let guard = SessionGuard::new(&state.store);
    guard.ping(&peer_cert.0, not_after.0)?;
    Ok("pong")
}

#[derive(rocket::FromForm)]
pub struct PostForm<'r> {
    archive: TempFile<'r>,
    signature: TempFile<'r>,
    hostname: String,
    version: String,
    nonce: Option<i64>,
}

#[post("/secure/post", data = "<form>")]
pub async fn post(
    state: &State<AppState>,
    peer_cert: PeerCertPem,
    peer: PeerIp,
    mut form: Form<PostForm<'_>>,
) -> Result<String, ApiError> {
    let archive_path = form.archive.path().ok_or_else(|| {
        ApiError(NivlheimError::BadRequest("archive upload is empty".into()))
    })?;
    let archive_bytes = tokio::fs::read(archive_path)
        .await
        .map_err(|e| ApiError(NivlheimError::internal(format!("reading uploaded archive: {e}"))))?;

    let signature_path = form.signature.path().ok_or_else(|| {
        ApiError(NivlheimError::BadRequest("signature upload is empty".into()))
    })?;
    let signature_bytes = tokio::fs::read(signature_path)
        .await
        .map_err(|e| ApiError(NivlheimError::internal(format!("reading uploaded signature: {e}"))))?;

    let verified = x509::verify_detached_sha256(&peer_cert.0, &archive_bytes, &signature_bytes)
        .map_err(NivlheimError::from)?;
    if !verified {
        return Err(ApiError(NivlheimError::Forbidden(
            "archive signature does not verify".into(),
        )));
    }

    let der = x509::der_of_pem_cert(
        std::str::from_utf8(&peer_cert.0)
            .map_err(|e| ApiError(NivlheimError::BadRequest(format!("peer cert is not valid PEM text: {e}"))))?,
    )
    .map_err(NivlheimError::from)?;
    let certfp = x509::fingerprint_sha1_hex(&der);
    let certcn = x509::common_name_of_pem_cert(&peer_cert.0)
        .map_err(NivlheimError::from)?
        .unwrap_or_default();

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let name = format!("{certfp}-{nanos}");
    let archive_dest = state.confdir.queue_dir().join(format!("{name}.tgz"));
    let meta_dest = state.confdir.queue_dir().join(format!("{name}.tgz.meta"));

    form.archive
        .persist_to(&archive_dest)
        .await
        .map_err(|e| ApiError(NivlheimError::internal(format!("enqueueing archive: {e}"))))?;

    let meta = format!(
        "received = {}\ncertfp = {}\nip = {}\nos_hostname = {}\ncertcn = {}\nclientversion = {}\n",
        Utc::now().timestamp(),
        certfp,
        peer.0,
        form.hostname,
        certcn,
        form.version,
    );
    tokio::fs::write(&meta_dest, meta)
        .await
        .map_err(|e| ApiError(NivlheimError::internal(format!("writing metadata sidecar: {e}"))))?;

    let mut body = "OK\n".to_string();
    if let Some(nonce) = form.nonce {
        body.push_str(&format!("nonce={nonce}\n"));
    }
    Ok(body)
}

#[get("/ingest?<file>")]
pub fn ingest(
    state: &State<AppState>,
    _loopback: LoopbackOnly,
    file: Option<String>,
) -> Result<&'static str, ApiError> {
    let file = file.ok_or_else(|| ApiError(NivlheimError::BadRequest("missing file parameter".into())))?;

    if file.contains('/') || file.contains('\\') {
        return Err(ApiError(NivlheimError::Forbidden(
            "file parameter must not contain a path separator".into(),
        )));
    }

    state.ingestor.ingest(&state.store, &file)?;
    Ok("OK\n")
}

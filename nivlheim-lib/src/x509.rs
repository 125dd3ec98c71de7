// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! X.509 helper functions — the equivalent of the teacher's `pgp` module,
//! rebuilt for the PKI primitives this spec actually needs: 4096-bit RSA
//! keypairs, CSRs, CA-signed certificates, SHA-1 fingerprints and PKCS#12
//! bundles. Grounded on the `rcgen`-based `ClusterCA` in
//! `claudefs-transport::enrollment` for the issuance shape (generate key,
//! build params, sign with the CA key, read back PEM/DER), adapted here
//! onto `openssl`'s `X509Req`/`X509Builder`/`Pkcs12` so that a real CSR is
//! parsed and the PKCS#12 framing §6 asks for is available.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509Name, X509Req, X509ReqBuilder, X509};

pub const RSA_BITS: u32 = 4096;
const CERT_VALIDITY_DAYS: u32 = 365;

/// The CA's own keypair and self-signed certificate.
pub struct CaIdentity {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl CaIdentity {
    pub fn from_pem(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self> {
        let key = PKey::private_key_from_pem(key_pem).context("parsing CA private key")?;
        let cert = X509::from_pem(cert_pem).context("parsing CA certificate")?;
        Ok(Self { key, cert })
    }

    /// Generate a fresh self-signed CA identity. Used only to bootstrap a
    /// brand new `<confdir>/CA` — an existing CA is always loaded from
    /// disk, never regenerated (the CA signing oracle is out of scope
    /// per spec.md §1, but the daemon must be able to stand itself up).
    pub fn generate(common_name: &str) -> Result<Self> {
        let rsa = Rsa::generate(RSA_BITS).context("generating CA RSA keypair")?;
        let key = PKey::from_rsa(rsa).context("wrapping CA key")?;

        let mut name = X509Name::builder()?;
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Nivlheim")?;
        let name = name.build();

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;

        let serial = random_serial()?;
        builder.set_serial_number(&serial)?;

        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(3650)?.as_ref())?;

        let basic_constraints = openssl::x509::extension::BasicConstraints::new()
            .ca()
            .critical()
            .build()?;
        builder.append_extension(basic_constraints)?;

        builder.sign(&key, MessageDigest::sha256())?;
        let cert = builder.build();

        Ok(Self { key, cert })
    }
}

fn random_serial() -> Result<Asn1Integer> {
    let mut bn = BigNum::new()?;
    bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
    Ok(bn.to_asn1_integer()?)
}

/// `GenerateKeyAndCSR` (§4.2): a fresh 4096-bit RSA keypair and a CSR for
/// `common_name`, both PEM-encoded.
pub fn generate_key_and_csr(common_name: &str) -> Result<(String, String)> {
    let rsa = Rsa::generate(RSA_BITS).context("generating client RSA keypair")?;
    let key = PKey::from_rsa(rsa).context("wrapping client key")?;

    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let mut req_builder = X509ReqBuilder::new()?;
    req_builder.set_subject_name(&name)?;
    req_builder.set_pubkey(&key)?;
    req_builder.sign(&key, MessageDigest::sha256())?;
    let csr = req_builder.build();

    let key_pem = String::from_utf8(key.private_key_to_pem_pkcs8()?)?;
    let csr_pem = String::from_utf8(csr.to_pem()?)?;

    Ok((key_pem, csr_pem))
}

/// `Sign` (§4.2): sign a CSR under the CA, with a caller-supplied
/// monotonic `serial` (read from the on-disk counter *after* signing, per
/// the contract — the counter advance itself lives in `caissuer`).
pub fn sign_csr(
    ca: &CaIdentity,
    csr_pem: &str,
    common_name: &str,
    serial: u64,
) -> Result<(String, Vec<u8>)> {
    let req = X509Req::from_pem(csr_pem.as_bytes()).context("parsing CSR")?;
    let pubkey = req.public_key().context("CSR has no usable public key")?;

    if !req.verify(&pubkey).context("CSR self-signature check failed")? {
        anyhow::bail!("CSR self-signature does not verify");
    }

    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let subject = name.build();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(ca.cert.subject_name())?;
    builder.set_pubkey(&pubkey)?;

    let serial_bn = BigNum::from_dec_str(&serial.to_string()).context("encoding serial number")?;
    builder.set_serial_number(&serial_bn.to_asn1_integer()?)?;

    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(CERT_VALIDITY_DAYS)?.as_ref())?;

    builder.sign(&ca.key, MessageDigest::sha256())?;
    let cert = builder.build();

    let cert_pem = String::from_utf8(cert.to_pem()?)?;
    let der = cert.to_der()?;

    Ok((cert_pem, der))
}

/// SHA-1 of the DER certificate, uppercase hex, no separators — the
/// `certfp` of §3/glossary.
pub fn fingerprint_sha1_hex(der: &[u8]) -> String {
    use sha1::{Digest, Sha1};

    let digest = Sha1::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

pub fn der_of_pem_cert(cert_pem: &str) -> Result<Vec<u8>> {
    let cert = X509::from_pem(cert_pem.as_bytes()).context("parsing certificate PEM")?;
    Ok(cert.to_der()?)
}

pub fn common_name_of_pem_cert(cert_pem: &[u8]) -> Result<Option<String>> {
    let cert = X509::from_pem(cert_pem).context("parsing certificate PEM")?;
    Ok(common_name_of(&cert))
}

pub fn common_name_of(cert: &X509) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

/// Build a PKCS#12 bundle of `{cert, key, CA chain}` (§6 glossary).
pub fn build_pkcs12(cert_pem: &str, key_pem: &str, ca_cert: &X509) -> Result<Vec<u8>> {
    let cert = X509::from_pem(cert_pem.as_bytes()).context("parsing issued cert for PKCS12")?;
    let key = PKey::private_key_from_pem(key_pem.as_bytes()).context("parsing issued key for PKCS12")?;

    let mut builder = Pkcs12::builder();
    builder.name("nivlheim");
    builder.pkey(&key);
    builder.cert(&cert);
    builder.ca({
        let mut stack = openssl::stack::Stack::new()?;
        stack.push(ca_cert.to_owned())?;
        stack
    });

    let pkcs12 = builder.build2("").context("building PKCS12 bundle")?;
    Ok(pkcs12.to_der()?)
}

/// Verify a detached PKCS#1v1.5/SHA-256 signature over `data` using the
/// public key embedded in `signer_cert_pem` — the `secure/post` upload's
/// proof of possession of the private key behind the presented mTLS
/// certificate (§6).
pub fn verify_detached_sha256(signer_cert_pem: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    use openssl::hash::MessageDigest;
    use openssl::sign::Verifier;

    let cert = X509::from_pem(signer_cert_pem).context("parsing signer certificate")?;
    let pubkey = cert.public_key().context("signer certificate has no usable public key")?;

    let mut verifier = Verifier::new(MessageDigest::sha256(), &pubkey)?;
    verifier.update(data)?;
    Ok(verifier.verify(signature)?)
}

/// Base64-encode `der` with 60-character lines, framed the way clients
/// parse it by regex (§6, "Response framing for enrollment").
pub fn frame_pkcs12(der: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let encoded = STANDARD.encode(der);

    let mut out = String::from("-----BEGIN P12-----\n");
    for chunk in encoded.as_bytes().chunks(60) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 alphabet is ASCII"));
        out.push('\n');
    }
    out.push_str("-----END P12-----\n");
    out
}

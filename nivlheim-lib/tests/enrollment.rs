// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use anyhow::Result;

use nivlheim_lib::caissuer::CaIssuer;
use nivlheim_lib::certstore::NewIssuedCert;
use nivlheim_lib::config::Confdir;
use nivlheim_lib::dns::FcrdnsResolver;
use nivlheim_lib::enroller::Enroller;
use nivlheim_lib::error::NivlheimError;
use nivlheim_lib::x509;

mod util;

/// After a fresh-identity `InsertIssued`, `first = certid` and
/// `previous = null` (§8).
#[test]
fn fresh_identity_sets_first_to_own_certid() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, der, _key_pem) = util::issue(&ca, "h1.example.org");
    let fp = x509::fingerprint_sha1_hex(&der);

    let certid = store.insert_issued(NewIssuedCert {
        fingerprint: &fp,
        common_name: "h1.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert_pem,
    })?;

    let looked_up = store.lookup_by_fingerprint(&fp)?.expect("row exists");
    assert_eq!(looked_up.certid, certid);
    assert_eq!(looked_up.first, certid);
    assert!(!looked_up.revoked);

    Ok(())
}

/// A renewal's `previous`/`first` match the parent identity, and the
/// `hostinfo`/`files` certfp rewrite is atomic (§8, scenario 3).
#[test]
fn renewal_preserves_identity_and_rewrites_certfp() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();

    let (cert1_pem, der1, _) = util::issue(&ca, "h2.example.org");
    let fp1 = x509::fingerprint_sha1_hex(&der1);
    let certid1 = store.insert_issued(NewIssuedCert {
        fingerprint: &fp1,
        common_name: "h2.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert1_pem,
    })?;
    let first1 = store.lookup_by_fingerprint(&fp1)?.unwrap().first;

    store.touch_hostinfo(
        &fp1,
        "192.0.2.5",
        "h2.example.org",
        chrono::Utc::now().naive_utc(),
        None,
    )?;

    let (cert2_pem, der2, _) = util::issue(&ca, "h2.example.org");
    let fp2 = x509::fingerprint_sha1_hex(&der2);
    let certid2 = store.insert_issued(NewIssuedCert {
        fingerprint: &fp2,
        common_name: "h2.example.org",
        previous: Some(certid1),
        first_of_chain: Some(first1),
        cert_pem: &cert2_pem,
    })?;

    store.hostinfo_upsert_after_enroll(&fp1, &fp2)?;

    let renewed = store.lookup_by_fingerprint(&fp2)?.unwrap();
    assert_eq!(renewed.first, first1);
    assert_ne!(certid2, certid1);

    let old = store.lookup_by_fingerprint(&fp1)?.unwrap();
    assert_eq!(old.first, first1);

    let hostinfo = store.hostinfo_by_certfp(&fp2)?.expect("rewritten hostinfo row exists");
    assert_eq!(hostinfo.certfp, fp2);
    assert!(store.hostinfo_by_certfp(&fp1)?.is_none());

    Ok(())
}

/// Revoking a certificate is visible to a subsequent lookup.
#[test]
fn revocation_is_visible_after_commit() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, der, _) = util::issue(&ca, "h3.example.org");
    let fp = x509::fingerprint_sha1_hex(&der);

    store.insert_issued(NewIssuedCert {
        fingerprint: &fp,
        common_name: "h3.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert_pem,
    })?;

    store.set_revoked(&fp)?;

    let looked_up = store.lookup_by_fingerprint(&fp)?.unwrap();
    assert!(looked_up.revoked);

    Ok(())
}

/// `reqcert` with an empty hostname, an IP outside every auto-approve
/// range, and no existing waiting-list entry must reject with 400
/// before ever consulting FCrDNS — a host with a working PTR record but
/// no `hostname` param is not silently queued (§4.3 step 2, §8).
#[test]
fn reqcert_rejects_empty_hostname_before_waiting_list_insert() -> Result<()> {
    let (_store_dir, store) = util::temp_store()?;
    let confdir_root = tempfile::TempDir::new()?;
    let confdir = Confdir::new(confdir_root.path());
    confdir.ensure_layout()?;

    let issuer = CaIssuer::open(confdir)?;
    let resolver = FcrdnsResolver::from_system_conf()?;
    let enroller = Enroller::new(&store, &issuer, &resolver);

    let peer_ip = "203.0.113.5".parse()?;
    let err = enroller.reqcert(peer_ip, Some("")).unwrap_err();
    assert!(matches!(err, NivlheimError::BadRequest(_)));

    let err = enroller.reqcert(peer_ip, None).unwrap_err();
    assert!(matches!(err, NivlheimError::BadRequest(_)));

    assert!(store.waiting_lookup("203.0.113.5")?.is_none());

    Ok(())
}

/// The waiting-list state machine: insert, approve, delete.
#[test]
fn waiting_list_approve_then_delete() -> Result<()> {
    let (_dir, store) = util::temp_store()?;

    store.waiting_insert("192.0.2.10", "foo")?;
    let entry = store.waiting_lookup("192.0.2.10")?.expect("entry exists");
    assert!(!entry.approved);

    store.waiting_approve("192.0.2.10")?;
    let entry = store.waiting_lookup("192.0.2.10")?.expect("entry exists");
    assert!(entry.approved);

    store.waiting_delete("192.0.2.10")?;
    assert!(store.waiting_lookup("192.0.2.10")?.is_none());

    Ok(())
}

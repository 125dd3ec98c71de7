// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use anyhow::Result;
use chrono::{Duration, Utc};

use nivlheim_lib::certstore::NewIssuedCert;
use nivlheim_lib::error::NivlheimError;
use nivlheim_lib::sessionguard::{PingOutcome, SessionGuard};
use nivlheim_lib::x509;

mod util;

fn enroll(store: &nivlheim_lib::certstore::CertStore, ca: &x509::CaIdentity, cn: &str) -> (String, String) {
    let (cert_pem, der, _key_pem) = util::issue(ca, cn);
    let fp = x509::fingerprint_sha1_hex(&der);
    store
        .insert_issued(NewIssuedCert {
            fingerprint: &fp,
            common_name: cn,
            previous: None,
            first_of_chain: None,
            cert_pem: &cert_pem,
        })
        .expect("insert_issued");
    (cert_pem, fp)
}

/// A certificate well within its validity window, with no hostinfo row
/// yet and no revocation, pings ok.
#[test]
fn fresh_certificate_with_no_hostinfo_pings_ok() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, _fp) = enroll(&store, &ca, "ok.example.org");

    let guard = SessionGuard::new(&store);
    let not_after = Utc::now() + Duration::days(300);
    let outcome = guard.ping(cert_pem.as_bytes(), not_after)?;
    assert_eq!(outcome, PingOutcome::Ok);

    Ok(())
}

/// A certificate less than 30 days from expiry is always rejected, even
/// though it is neither revoked nor drifted (§4.4, §8 boundary case).
#[test]
fn expiring_soon_certificate_is_forbidden() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, _fp) = enroll(&store, &ca, "expiring.example.org");

    let guard = SessionGuard::new(&store);
    let not_after = Utc::now() + Duration::days(29) + Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59);

    let err = guard.ping(cert_pem.as_bytes(), not_after).unwrap_err();
    assert!(matches!(err, NivlheimError::Forbidden(_)));

    Ok(())
}

/// A revoked certificate is rejected regardless of remaining validity.
#[test]
fn revoked_certificate_is_forbidden() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, fp) = enroll(&store, &ca, "revoked.example.org");
    store.set_revoked(&fp)?;

    let guard = SessionGuard::new(&store);
    let not_after = Utc::now() + Duration::days(300);

    let err = guard.ping(cert_pem.as_bytes(), not_after).unwrap_err();
    assert!(matches!(err, NivlheimError::Forbidden(_)));

    Ok(())
}

/// Hostname drift between the certificate's CN and the last-seen
/// `hostinfo.os_hostname` forces a renewal rather than a silent ping.
#[test]
fn hostname_drift_from_hostinfo_is_forbidden() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, fp) = enroll(&store, &ca, "drift.example.org");

    store.touch_hostinfo(&fp, "192.0.2.50", "renamed.example.org", Utc::now().naive_utc(), None)?;

    let guard = SessionGuard::new(&store);
    let not_after = Utc::now() + Duration::days(300);

    let err = guard.ping(cert_pem.as_bytes(), not_after).unwrap_err();
    assert!(matches!(err, NivlheimError::Forbidden(_)));

    Ok(())
}

/// Matching hostinfo.os_hostname does not trip the drift check.
#[test]
fn matching_hostinfo_still_pings_ok() -> Result<()> {
    let (_dir, store) = util::temp_store()?;
    let ca = util::test_ca();
    let (cert_pem, fp) = enroll(&store, &ca, "steady.example.org");

    store.touch_hostinfo(&fp, "192.0.2.51", "steady.example.org", Utc::now().naive_utc(), None)?;

    let guard = SessionGuard::new(&store);
    let not_after = Utc::now() + Duration::days(300);

    let outcome = guard.ping(cert_pem.as_bytes(), not_after)?;
    assert_eq!(outcome, PingOutcome::Ok);

    Ok(())
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use std::io::Write;

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;

use nivlheim_lib::certstore::NewIssuedCert;
use nivlheim_lib::config::Confdir;
use nivlheim_lib::ingestor::Ingestor;
use nivlheim_lib::x509;

mod util;

/// Build a `.tgz` archive containing one `files/etc/hostname` member and
/// one `commands/uname_-a` member, and drop it (plus its `.meta` sidecar)
/// into `<confdir>/queue/`.
fn write_fixture_archive(
    confdir: &Confdir,
    name: &str,
    certfp: &str,
    hostname_contents: &[u8],
    command_output: &[u8],
) -> Result<()> {
    std::fs::create_dir_all(confdir.queue_dir())?;

    let archive_path = confdir.queue_dir().join(name);
    let meta_path = confdir.queue_dir().join(format!("{name}.meta"));

    let tar_gz = std::fs::File::create(&archive_path)?;
    let enc = GzEncoder::new(tar_gz, Compression::default());
    let mut builder = tar::Builder::new(enc);

    append_file(&mut builder, "files/etc/hostname", hostname_contents)?;
    append_file(&mut builder, "commands/uname_-a", command_output)?;
    builder.finish()?;

    let received = chrono::Utc::now().timestamp();
    let meta = format!(
        "received = {received}\ncertfp = {certfp}\nip = 192.0.2.20\nos_hostname = h.example.org\ncertcn = h.example.org\n"
    );
    std::fs::write(&meta_path, meta)?;

    Ok(())
}

fn append_file(builder: &mut tar::Builder<GzEncoder<std::fs::File>>, path: &str, contents: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, contents)?;
    Ok(())
}

/// A fresh archive inserts one row per member file, marked `current`.
#[test]
fn ingest_inserts_files_as_current() -> Result<()> {
    let (_store_dir, store) = util::temp_store()?;
    let confdir_root = tempfile::TempDir::new()?;
    let confdir = Confdir::new(confdir_root.path());
    confdir.ensure_layout()?;

    let ca = util::test_ca();
    let (cert_pem, der, _key_pem) = util::issue(&ca, "h.example.org");
    let fp = x509::fingerprint_sha1_hex(&der);
    store.insert_issued(NewIssuedCert {
        fingerprint: &fp,
        common_name: "h.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert_pem,
    })?;

    write_fixture_archive(&confdir, "archive1.tgz", &fp, b"h.example.org\n", b"Linux h 5.10.0\n")?;

    let ingestor = Ingestor::new(confdir.clone());
    ingestor.ingest(&store, "archive1.tgz")?;

    let hostinfo = store.hostinfo_by_certfp(&fp)?.expect("hostinfo row created");
    assert_eq!(hostinfo.certfp, fp);

    assert!(!confdir.queue_dir().join("archive1.tgz").exists());
    assert!(!confdir.queue_dir().join("archive1.tgz.meta").exists());

    Ok(())
}

/// A second archive with an unchanged file's contents does not insert a
/// duplicate row (CRC-based suppression, §4.5 step 5 / §8).
#[test]
fn unchanged_file_is_not_reinserted_on_second_archive() -> Result<()> {
    let (_store_dir, store) = util::temp_store()?;
    let confdir_root = tempfile::TempDir::new()?;
    let confdir = Confdir::new(confdir_root.path());
    confdir.ensure_layout()?;

    let ca = util::test_ca();
    let (cert_pem, der, _key_pem) = util::issue(&ca, "h2.example.org");
    let fp = x509::fingerprint_sha1_hex(&der);
    store.insert_issued(NewIssuedCert {
        fingerprint: &fp,
        common_name: "h2.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert_pem,
    })?;

    let ingestor = Ingestor::new(confdir.clone());

    write_fixture_archive(&confdir, "a1.tgz", &fp, b"same content\n", b"same output\n")?;
    ingestor.ingest(&store, "a1.tgz")?;

    write_fixture_archive(&confdir, "a2.tgz", &fp, b"same content\n", b"same output\n")?;
    ingestor.ingest(&store, "a2.tgz")?;

    let conn = store.db().get()?;
    let count: i64 = {
        use diesel::prelude::*;
        use nivlheim_lib::db::schema::files::dsl::*;
        files.filter(certfp.eq(&fp)).count().get_result(&conn)?
    };
    assert_eq!(count, 2, "unchanged files across two archives should not duplicate rows");

    Ok(())
}

/// A changed file across two archives produces two rows, with only the
/// newest marked `current` (§4.5 step 6).
#[test]
fn changed_file_flips_current_flag() -> Result<()> {
    let (_store_dir, store) = util::temp_store()?;
    let confdir_root = tempfile::TempDir::new()?;
    let confdir = Confdir::new(confdir_root.path());
    confdir.ensure_layout()?;

    let ca = util::test_ca();
    let (cert_pem, der, _key_pem) = util::issue(&ca, "h3.example.org");
    let fp = x509::fingerprint_sha1_hex(&der);
    store.insert_issued(NewIssuedCert {
        fingerprint: &fp,
        common_name: "h3.example.org",
        previous: None,
        first_of_chain: None,
        cert_pem: &cert_pem,
    })?;

    let ingestor = Ingestor::new(confdir.clone());

    write_fixture_archive(&confdir, "b1.tgz", &fp, b"version one\n", b"out one\n")?;
    ingestor.ingest(&store, "b1.tgz")?;

    write_fixture_archive(&confdir, "b2.tgz", &fp, b"version two\n", b"out two\n")?;
    ingestor.ingest(&store, "b2.tgz")?;

    let conn = store.db().get()?;
    use diesel::prelude::*;
    use nivlheim_lib::db::schema::files::dsl::*;

    let hostname_rows: Vec<(String, bool)> = files
        .filter(certfp.eq(&fp))
        .filter(filename.eq("etc/hostname"))
        .select((content, current))
        .load(&conn)?;

    assert_eq!(hostname_rows.len(), 2);
    let current_rows: Vec<&(String, bool)> = hostname_rows.iter().filter(|(_, c)| *c).collect();
    assert_eq!(current_rows.len(), 1);
    assert_eq!(current_rows[0].0, "version two\n");

    Ok(())
}

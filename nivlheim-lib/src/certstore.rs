// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Persistence abstraction over `certificates`, `hostinfo`, `files`,
//! `waiting_for_approval` and `ipranges` (§4.1).
//!
//! Structured the way the teacher splits `CaStorage`/`CaStorageWrite`
//! over a `DbCa` handle: a trait for the operations, one struct backed by
//! the pooled `Db` implementing it. The store never silently creates
//! rows on lookup, and every write here either is already inside a
//! transaction or is itself the whole transaction.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use anyhow::{Context, Result};

use crate::db::{models, schema::*, Db};

/// Result of `LookupByFingerprint`: the bits of a `certificates` row
/// callers need without exposing the row type itself.
#[derive(Debug, Clone)]
pub struct CertLookup {
    pub certid: i32,
    pub first: i32,
    pub revoked: bool,
    pub common_name: String,
}

pub struct NewIssuedCert<'a> {
    pub fingerprint: &'a str,
    pub common_name: &'a str,
    pub previous: Option<i32>,
    /// `first` of the *parent* cert, when this is a renewal. `None` for a
    /// fresh identity — the store resolves `first := certid` itself.
    pub first_of_chain: Option<i32>,
    pub cert_pem: &'a str,
}

pub struct NewIngestedFile<'a> {
    pub certfp: &'a str,
    pub filename: &'a str,
    pub received: NaiveDateTime,
    pub mtime: NaiveDateTime,
    pub content: &'a str,
    pub crc32: i32,
    pub is_command: bool,
    pub clientversion: Option<&'a str>,
    pub ipaddr: &'a str,
    pub os_hostname: &'a str,
    pub certcn: &'a str,
}

pub struct CertStore {
    db: Db,
}

impl CertStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    // -------- certificates

    pub fn lookup_by_fingerprint(&self, fp: &str) -> Result<Option<CertLookup>> {
        let conn = self.db.get()?;

        let row = certificates::table
            .filter(certificates::fingerprint.eq(fp))
            .first::<models::Certificate>(&conn)
            .optional()
            .context("lookup_by_fingerprint failed")?;

        Ok(row.map(|c| CertLookup {
            certid: c.certid,
            first: c.first.unwrap_or(c.certid),
            revoked: c.revoked,
            common_name: c.commonname,
        }))
    }

    /// Insert a freshly-issued certificate. For a fresh identity
    /// (`first_of_chain = None`), resolves `first := certid` in a second
    /// statement inside the same transaction, per the invariant in §3.
    pub fn insert_issued(&self, new: NewIssuedCert<'_>) -> Result<i32> {
        self.db.transaction(|conn| -> Result<i32> {
            let issued = Utc::now().naive_utc();

            let previous = new.previous;
            let first_placeholder = new.first_of_chain;

            diesel::insert_into(certificates::table)
                .values(&models::NewCertificate {
                    fingerprint: new.fingerprint,
                    commonname: new.common_name,
                    issued,
                    revoked: false,
                    previous,
                    first: first_placeholder,
                    certpem: new.cert_pem,
                })
                .execute(conn)
                .context("insert_issued: insert failed")?;

            let certid: i32 = certificates::table
                .filter(certificates::fingerprint.eq(new.fingerprint))
                .select(certificates::certid)
                .first(conn)
                .context("insert_issued: could not read back certid")?;

            if first_placeholder.is_none() {
                diesel::update(certificates::table.filter(certificates::certid.eq(certid)))
                    .set(certificates::first.eq(certid))
                    .execute(conn)
                    .context("insert_issued: first backfill failed")?;
            }

            Ok(certid)
        })
    }

    /// Every certificate sharing the `first` identity of the cert
    /// fingerprinted `fp`, oldest first — the renewal chain for one host
    /// (used by the operator CLI's `cert show`).
    pub fn chain_by_fingerprint(&self, fp: &str) -> Result<Option<Vec<models::Certificate>>> {
        let conn = self.db.get()?;

        let anchor = certificates::table
            .filter(certificates::fingerprint.eq(fp))
            .first::<models::Certificate>(&conn)
            .optional()
            .context("chain_by_fingerprint: lookup failed")?;

        let Some(anchor) = anchor else {
            return Ok(None);
        };
        let first = anchor.first.unwrap_or(anchor.certid);

        let chain = certificates::table
            .filter(certificates::first.eq(first))
            .order(certificates::issued.asc())
            .load::<models::Certificate>(&conn)
            .context("chain_by_fingerprint: chain load failed")?;

        Ok(Some(chain))
    }

    pub fn set_revoked(&self, fp: &str) -> Result<()> {
        let conn = self.db.get()?;
        let now = Utc::now().naive_utc();

        diesel::update(certificates::table.filter(certificates::fingerprint.eq(fp)))
            .set((certificates::revoked.eq(true), certificates::revoked_at.eq(Some(now))))
            .execute(&conn)
            .context("set_revoked failed")?;

        Ok(())
    }

    // -------- waiting list

    pub fn waiting_lookup(&self, ip: &str) -> Result<Option<models::WaitingEntry>> {
        let conn = self.db.get()?;

        waiting_for_approval::table
            .filter(waiting_for_approval::ipaddr.eq(ip))
            .first::<models::WaitingEntry>(&conn)
            .optional()
            .context("waiting_lookup failed")
    }

    pub fn waiting_insert(&self, ip: &str, hostname: &str) -> Result<()> {
        let conn = self.db.get()?;
        let now = Utc::now().naive_utc();

        diesel::insert_into(waiting_for_approval::table)
            .values(&models::NewWaitingEntry {
                ipaddr: ip,
                hostname,
                received: now,
                approved: false,
            })
            .execute(&conn)
            .context("waiting_insert failed")?;

        Ok(())
    }

    /// Best-effort delete; a failure here is logged by the caller, not
    /// surfaced, per §4.3 step 5 / §7.
    pub fn waiting_delete(&self, ip: &str) -> Result<()> {
        let conn = self.db.get()?;

        diesel::delete(waiting_for_approval::table.filter(waiting_for_approval::ipaddr.eq(ip)))
            .execute(&conn)
            .context("waiting_delete failed")?;

        Ok(())
    }

    pub fn waiting_list(&self) -> Result<Vec<models::WaitingEntry>> {
        let conn = self.db.get()?;
        waiting_for_approval::table
            .order(waiting_for_approval::received.asc())
            .load(&conn)
            .context("waiting_list failed")
    }

    pub fn waiting_approve(&self, ip: &str) -> Result<()> {
        let conn = self.db.get()?;
        diesel::update(waiting_for_approval::table.filter(waiting_for_approval::ipaddr.eq(ip)))
            .set(waiting_for_approval::approved.eq(true))
            .execute(&conn)
            .context("waiting_approve failed")?;
        Ok(())
    }

    // -------- ip ranges

    pub fn ipranges(&self) -> Result<Vec<String>> {
        let conn = self.db.get()?;
        ipranges::table
            .select(ipranges::iprange)
            .load(&conn)
            .context("ipranges failed")
    }

    pub fn iprange_add(&self, cidr: &str) -> Result<()> {
        let conn = self.db.get()?;
        diesel::insert_into(ipranges::table)
            .values(&models::NewIpRange { iprange: cidr })
            .execute(&conn)
            .context("iprange_add failed")?;
        Ok(())
    }

    // -------- hostinfo / files

    /// Atomic rewrite of `hostinfo.certfp` and of `files.certfp` for all
    /// rows carrying the old fingerprint, per §4.1/§4.3 step 6.
    pub fn hostinfo_upsert_after_enroll(&self, old_fp: &str, new_fp: &str) -> Result<()> {
        self.db.transaction(|conn| -> Result<()> {
            diesel::update(hostinfo::table.filter(hostinfo::certfp.eq(old_fp)))
                .set(hostinfo::certfp.eq(new_fp))
                .execute(conn)
                .context("hostinfo_upsert_after_enroll: hostinfo rewrite failed")?;

            diesel::update(files::table.filter(files::certfp.eq(old_fp)))
                .set(files::certfp.eq(new_fp))
                .execute(conn)
                .context("hostinfo_upsert_after_enroll: files rewrite failed")?;

            Ok(())
        })
    }

    pub fn hostinfo_by_certfp(&self, fp: &str) -> Result<Option<models::HostInfo>> {
        let conn = self.db.get()?;
        hostinfo::table
            .filter(hostinfo::certfp.eq(fp))
            .first::<models::HostInfo>(&conn)
            .optional()
            .context("hostinfo_by_certfp failed")
    }

    /// The CRC32 (signed, see `crate::util::crc32_signed`) of the current
    /// row for `(certfp, filename)`, if one exists. Takes the ingesting
    /// archive's own connection so the read is part of its transaction —
    /// a second pooled connection would otherwise contend for sqlite's
    /// single writer lock.
    pub fn get_latest_crc(
        &self,
        conn: &SqliteConnection,
        certfp: &str,
        filename: &str,
    ) -> Result<Option<i32>> {
        files::table
            .filter(files::certfp.eq(certfp))
            .filter(files::filename.eq(filename))
            .filter(files::current.eq(true))
            .select(files::crc32)
            .first(conn)
            .optional()
            .context("get_latest_crc failed")
    }

    /// `UPDATE files SET current=false WHERE certfp=? AND current` —
    /// issued once per archive, before the first insert (§4.5 step 6).
    /// Must run on `conn`, the same connection/transaction as the
    /// subsequent inserts, so the per-archive atomicity holds.
    pub fn mark_all_non_current(&self, conn: &SqliteConnection, certfp: &str) -> Result<()> {
        diesel::update(
            files::table
                .filter(files::certfp.eq(certfp))
                .filter(files::current.eq(true)),
        )
        .set(files::current.eq(false))
        .execute(conn)
        .context("mark_all_non_current failed")?;

        Ok(())
    }

    pub fn insert_file_record(
        &self,
        conn: &SqliteConnection,
        f: &NewIngestedFile<'_>,
        originalcertid: Option<i32>,
    ) -> Result<()> {
        diesel::insert_into(files::table)
            .values(&models::NewFileRecord {
                certfp: f.certfp,
                filename: f.filename,
                received: f.received,
                mtime: f.mtime,
                content: f.content,
                crc32: f.crc32,
                is_command: f.is_command,
                clientversion: f.clientversion,
                ipaddr: f.ipaddr,
                os_hostname: f.os_hostname,
                certcn: f.certcn,
                originalcertid,
                current: true,
            })
            .execute(conn)
            .context("insert_file_record failed")?;

        Ok(())
    }

    pub fn originalcertid_for_fingerprint(
        &self,
        conn: &SqliteConnection,
        certfp: &str,
    ) -> Result<Option<i32>> {
        certificates::table
            .filter(certificates::fingerprint.eq(certfp))
            .select(certificates::certid)
            .first(conn)
            .optional()
            .context("originalcertid_for_fingerprint failed")
    }

    /// `TouchHostInfo` (§4.5 step 7): advance `lastseen` monotonically and
    /// invalidate the DNS cache (`dnsttl`) on identity drift. Runs on its
    /// own connection outside the per-archive transaction — it's
    /// idempotent and safe to retry if the enclosing archive rolls back.
    pub fn touch_hostinfo(
        &self,
        certfp: &str,
        ipaddr: &str,
        os_hostname: &str,
        received: NaiveDateTime,
        clientversion: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.get()?;

        let existing = self.hostinfo_by_certfp(certfp)?;

        match existing {
            None => {
                diesel::insert_into(hostinfo::table)
                    .values(&models::NewHostInfo {
                        certfp,
                        ipaddr,
                        os_hostname,
                        lastseen: received,
                        clientversion,
                        dnsttl: None,
                    })
                    .execute(&conn)
                    .context("touch_hostinfo: insert failed")?;
            }
            Some(row) => {
                if row.lastseen < received {
                    diesel::update(hostinfo::table.filter(hostinfo::certfp.eq(certfp)))
                        .set((
                            hostinfo::lastseen.eq(received),
                            hostinfo::clientversion.eq(clientversion),
                        ))
                        .execute(&conn)
                        .context("touch_hostinfo: lastseen update failed")?;
                }

                if row.ipaddr != ipaddr || row.os_hostname != os_hostname {
                    diesel::update(hostinfo::table.filter(hostinfo::certfp.eq(certfp)))
                        .set((
                            hostinfo::ipaddr.eq(ipaddr),
                            hostinfo::os_hostname.eq(os_hostname),
                            hostinfo::dnsttl.eq(None::<NaiveDateTime>),
                        ))
                        .execute(&conn)
                        .context("touch_hostinfo: drift update failed")?;
                }
            }
        }

        Ok(())
    }
}

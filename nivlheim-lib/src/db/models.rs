// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Queryable/Insertable row types for §3's data model.

use chrono::NaiveDateTime;

use super::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "certificates"]
#[primary_key(certid)]
pub struct Certificate {
    pub certid: i32,
    pub fingerprint: String,
    pub commonname: String,
    pub issued: NaiveDateTime,
    pub revoked: bool,
    pub revoked_at: Option<NaiveDateTime>,
    pub previous: Option<i32>,
    pub first: Option<i32>,
    pub certpem: String,
}

#[derive(Debug, Insertable)]
#[table_name = "certificates"]
pub struct NewCertificate<'a> {
    pub fingerprint: &'a str,
    pub commonname: &'a str,
    pub issued: NaiveDateTime,
    pub revoked: bool,
    pub previous: Option<i32>,
    pub first: Option<i32>,
    pub certpem: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "hostinfo"]
#[primary_key(certfp)]
pub struct HostInfo {
    pub certfp: String,
    pub ipaddr: String,
    pub os_hostname: String,
    pub lastseen: NaiveDateTime,
    pub clientversion: Option<String>,
    pub dnsttl: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[table_name = "hostinfo"]
pub struct NewHostInfo<'a> {
    pub certfp: &'a str,
    pub ipaddr: &'a str,
    pub os_hostname: &'a str,
    pub lastseen: NaiveDateTime,
    pub clientversion: Option<&'a str>,
    pub dnsttl: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "files"]
pub struct FileRecord {
    pub id: i32,
    pub certfp: String,
    pub filename: String,
    pub received: NaiveDateTime,
    pub mtime: NaiveDateTime,
    pub content: String,
    pub crc32: i32,
    pub is_command: bool,
    pub clientversion: Option<String>,
    pub ipaddr: String,
    pub os_hostname: String,
    pub certcn: String,
    pub originalcertid: Option<i32>,
    pub current: bool,
}

#[derive(Debug, Insertable)]
#[table_name = "files"]
pub struct NewFileRecord<'a> {
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
    pub originalcertid: Option<i32>,
    pub current: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "waiting_for_approval"]
#[primary_key(ipaddr)]
pub struct WaitingEntry {
    pub ipaddr: String,
    pub hostname: String,
    pub received: NaiveDateTime,
    pub approved: bool,
}

#[derive(Debug, Insertable)]
#[table_name = "waiting_for_approval"]
pub struct NewWaitingEntry<'a> {
    pub ipaddr: &'a str,
    pub hostname: &'a str,
    pub received: NaiveDateTime,
    pub approved: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "ipranges"]
pub struct IpRange {
    pub id: i32,
    pub iprange: String,
}

#[derive(Debug, Insertable)]
#[table_name = "ipranges"]
pub struct NewIpRange<'a> {
    pub iprange: &'a str,
}

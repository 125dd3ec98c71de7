// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Diesel table definitions for the five tables of §3: `certificates`,
//! `hostinfo`, `files`, `waiting_for_approval`, `ipranges`.

table! {
    certificates (certid) {
        certid -> Integer,
        fingerprint -> Text,
        commonname -> Text,
        issued -> Timestamp,
        revoked -> Bool,
        revoked_at -> Nullable<Timestamp>,
        previous -> Nullable<Integer>,
        first -> Nullable<Integer>,
        certpem -> Text,
    }
}

table! {
    hostinfo (certfp) {
        certfp -> Text,
        ipaddr -> Text,
        os_hostname -> Text,
        lastseen -> Timestamp,
        clientversion -> Nullable<Text>,
        dnsttl -> Nullable<Timestamp>,
    }
}

table! {
    files (id) {
        id -> Integer,
        certfp -> Text,
        filename -> Text,
        received -> Timestamp,
        mtime -> Timestamp,
        content -> Text,
        crc32 -> Integer,
        is_command -> Bool,
        clientversion -> Nullable<Text>,
        ipaddr -> Text,
        os_hostname -> Text,
        certcn -> Text,
        originalcertid -> Nullable<Integer>,
        current -> Bool,
    }
}

table! {
    waiting_for_approval (ipaddr) {
        ipaddr -> Text,
        hostname -> Text,
        received -> Timestamp,
        approved -> Bool,
    }
}

table! {
    ipranges (id) {
        id -> Integer,
        iprange -> Text,
    }
}

allow_tables_to_appear_in_same_query!(certificates, hostinfo, files, waiting_for_approval, ipranges,);

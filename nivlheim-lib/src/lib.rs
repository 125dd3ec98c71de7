// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Nivlheim core: the enrollment, ingestion and certificate-lifecycle
//! subsystem described in the design document (§1-§8). Five components,
//! leaves first: [`certstore`], [`caissuer`], [`enroller`],
//! [`sessionguard`], [`ingestor`]. [`x509`], [`dns`], [`archive`] and
//! [`util`] are the supporting primitives the teacher's `pgp` module
//! doesn't have an X.509/network analog for.

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod archive;
pub mod caissuer;
pub mod certstore;
pub mod config;
pub mod db;
pub mod dns;
pub mod enroller;
pub mod error;
pub mod ingestor;
pub mod sessionguard;
pub mod util;
pub mod x509;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

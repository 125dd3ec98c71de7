// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Managed state shared across request-handling workers (§5): the
//! pooled database handle and the CA signing lock, wrapped in the
//! component types that own them.

use anyhow::Result;

use nivlheim_lib::caissuer::CaIssuer;
use nivlheim_lib::certstore::CertStore;
use nivlheim_lib::config::Confdir;
use nivlheim_lib::db::Db;
use nivlheim_lib::dns::FcrdnsResolver;
use nivlheim_lib::ingestor::Ingestor;

pub struct AppState {
    pub confdir: Confdir,
    pub store: CertStore,
    pub issuer: CaIssuer,
    pub resolver: FcrdnsResolver,
    pub ingestor: Ingestor,
}

impl AppState {
    pub fn open(confdir: Confdir, database_url: &str) -> Result<Self> {
        confdir.ensure_layout()?;

        let db = Db::new(database_url)?;
        let store = CertStore::new(db);
        let issuer = CaIssuer::open(confdir.clone())?;
        let resolver = FcrdnsResolver::from_system_conf()?;
        let ingestor = Ingestor::new(confdir.clone());

        Ok(Self { confdir, store, issuer, resolver, ingestor })
    }
}

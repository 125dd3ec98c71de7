// Copyright 2019-2022 Heiko Schaefer <heiko@schaefer.name>
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca
//
// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Front daemon for Nivlheim: enrollment, ping and archive-ingestion
//! endpoints (§6). TLS termination and client-certificate presentation
//! happen upstream of this process — see `guards.rs`.

#[macro_use]
extern crate rocket;

mod cli;
mod guards;
mod responder;
mod routes;
mod state;

use clap::Parser;

use nivlheim_lib::config::Confdir;

use cli::{Command, ServerCli};
use state::AppState;

#[launch]
fn rocket() -> rocket::Rocket<rocket::Build> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = ServerCli::parse();

    match cli.cmd {
        Command::Run => {}
    }

    let confdir = Confdir::resolve(cli.confdir.as_deref())
        .expect("failed to resolve confdir (pass --confdir or set NIVLHEIM_CONFDIR)");
    let database_url = confdir.database_url(cli.database.as_deref());

    let state = AppState::open(confdir, &database_url).expect("failed to initialize server state");

    rocket::build().manage(state).mount(
        "/",
        routes![
            routes::reqcert,
            routes::renewcert,
            routes::ping,
            routes::post,
            routes::ingest,
        ],
    )
}

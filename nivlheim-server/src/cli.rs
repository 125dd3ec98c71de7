// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(
    name = "nivlheim-server",
    author = "Heiko Schäfer <heiko@schaefer.name>",
    version,
    about = "Nivlheim front daemon: enrollment, ping and archive-ingestion endpoints."
)]
pub struct ServerCli {
    /// Root of the on-disk confdir layout (queue/CA/db/certs). Falls
    /// back to `NIVLHEIM_CONFDIR` when omitted.
    #[clap(name = "confdir", short = 'c', long = "confdir")]
    pub confdir: Option<String>,

    /// Override the sqlite database URL (defaults to `<confdir>/db/nivlheim.sqlite`).
    #[clap(name = "filename", short = 'd', long = "database")]
    pub database: Option<String>,

    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the front daemon.
    Run,
}

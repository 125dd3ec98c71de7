// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(
    name = "nivlheim",
    author = "Heiko Schäfer <heiko@schaefer.name>",
    version,
    about = "Nivlheim operator CLI: waiting-list review, IP ranges, certificate reporting."
)]
pub struct Cli {
    /// Root of the on-disk confdir layout. Falls back to `NIVLHEIM_CONFDIR`.
    #[clap(name = "confdir", short = 'c', long = "confdir")]
    pub confdir: Option<String>,

    #[clap(name = "filename", short = 'd', long = "database")]
    pub database: Option<String>,

    #[clap(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the unapproved-enrollment waiting list.
    Waiting {
        #[clap(subcommand)]
        cmd: WaitingCommand,
    },
    /// Manage IP ranges eligible for auto-enrollment.
    Iprange {
        #[clap(subcommand)]
        cmd: IprangeCommand,
    },
    /// Inspect the certificate chain for a host.
    Cert {
        #[clap(subcommand)]
        cmd: CertCommand,
    },
    /// Run pending database migrations.
    Migrate,
    /// Reclaim unused sqlite pages.
    Vacuum,
}

#[derive(Subcommand)]
pub enum WaitingCommand {
    /// List all entries, approved or not.
    List,
    /// Approve a waiting entry by its IP address.
    Approve { ip: String },
}

#[derive(Subcommand)]
pub enum IprangeCommand {
    List,
    Add { cidr: String },
}

#[derive(Subcommand)]
pub enum CertCommand {
    /// Show the chain of certificates sharing a `first` identity.
    Show { fingerprint: String },
    /// Mark a certificate revoked.
    Revoke { fingerprint: String },
}

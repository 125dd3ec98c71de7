// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

use anyhow::Result;
use clap::Parser;

use nivlheim_lib::certstore::CertStore;
use nivlheim_lib::config::Confdir;
use nivlheim_lib::db::Db;

mod cli;

/// How long ago `when` (UTC) was, rendered the way an operator reads a
/// log timestamp at a glance.
fn ago(when: chrono::NaiveDateTime) -> String {
    let elapsed = chrono::Utc::now().naive_utc() - when;
    match elapsed.to_std() {
        Ok(d) => format!("{} ago", humantime::format_duration(d)),
        Err(_) => "just now".to_string(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let version = format!("{} (nivlheim-lib {})", env!("CARGO_PKG_VERSION"), nivlheim_lib::VERSION);
    let c = cli::Cli::parse();
    let _ = &version;

    let confdir = Confdir::resolve(c.confdir.as_deref())?;
    let database_url = confdir.database_url(c.database.as_deref());
    let db = Db::new(&database_url)?;
    let store = CertStore::new(db);

    match c.cmd {
        cli::Commands::Waiting { cmd } => match cmd {
            cli::WaitingCommand::List => {
                for entry in store.waiting_list()? {
                    println!(
                        "{}\t{}\treceived {}\t{}",
                        entry.ipaddr,
                        entry.hostname,
                        ago(entry.received),
                        if entry.approved { "approved" } else { "pending" }
                    );
                }
            }
            cli::WaitingCommand::Approve { ip } => {
                store.waiting_approve(&ip)?;
                println!("approved {ip}");
            }
        },
        cli::Commands::Iprange { cmd } => match cmd {
            cli::IprangeCommand::List => {
                for cidr in store.ipranges()? {
                    println!("{cidr}");
                }
            }
            cli::IprangeCommand::Add { cidr } => {
                store.iprange_add(&cidr)?;
                println!("added {cidr}");
            }
        },
        cli::Commands::Cert { cmd } => match cmd {
            cli::CertCommand::Show { fingerprint } => match store.chain_by_fingerprint(&fingerprint)? {
                Some(chain) => {
                    for cert in chain {
                        println!(
                            "{}\t{}\t{}\tissued {}\t{}",
                            cert.certid,
                            cert.fingerprint,
                            cert.commonname,
                            ago(cert.issued),
                            if cert.revoked { "revoked" } else { "active" }
                        );
                    }
                }
                None => println!("no certificate with fingerprint {fingerprint}"),
            },
            cli::CertCommand::Revoke { fingerprint } => {
                store.set_revoked(&fingerprint)?;
                println!("revoked {fingerprint}");
            }
        },
        cli::Commands::Migrate => {
            store.db().run_migrations()?;
            println!("migrations up to date");
        }
        cli::Commands::Vacuum => {
            store.db().vacuum()?;
            println!("vacuum complete");
        }
    }

    Ok(())
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Forward-confirmed reverse DNS (§4.3 step 3, glossary "FCrDNS").
//!
//! No analog in the teacher (which never resolves a hostname), so this
//! is enriched from `agentgateway`'s `hickory-resolver` usage in
//! `admin.rs`: build one `Resolver` from the system config and reuse it,
//! rather than standing up a fresh one per lookup.

use std::net::IpAddr;

use anyhow::{Context, Result};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::Resolver;

pub struct FcrdnsResolver {
    resolver: Resolver,
}

/// Outcome of a forward-confirmed reverse DNS check.
#[derive(Debug, Clone)]
pub enum FcrdnsResult {
    /// PTR resolved to `hostname`, and `hostname` resolves back to the
    /// original address. This is the only case §4.3 treats as a usable
    /// hostname.
    Confirmed { hostname: String },
    /// PTR resolved, but the forward lookup didn't return the original
    /// address (or failed outright).
    Unconfirmed,
    /// No PTR record at all.
    NoPtr,
}

impl FcrdnsResolver {
    pub fn from_system_conf() -> Result<Self> {
        let resolver = Resolver::from_system_conf()
            .or_else(|_| Resolver::new(ResolverConfig::default(), ResolverOpts::default()))
            .context("failed to build a DNS resolver")?;
        Ok(Self { resolver })
    }

    /// Reverse-resolve `addr`, then forward-resolve the result and check
    /// it maps back to `addr`. Any resolution failure degrades to
    /// `Unconfirmed`/`NoPtr` rather than an error — DNS flakiness must
    /// never abort enrollment (§4.3, §7: "DNS lookups that never resolve
    /// must never hang a request indefinitely or abort the request" —
    /// implemented here by simply not erroring on failure; the bound on
    /// hang time is the resolver's own lookup timeout).
    pub fn check(&self, addr: IpAddr) -> FcrdnsResult {
        let ptr_names = match self.resolver.reverse_lookup(addr) {
            Ok(lookup) => lookup,
            Err(_) => return FcrdnsResult::NoPtr,
        };

        for name in ptr_names.iter() {
            let hostname = name.to_string();
            let trimmed = hostname.trim_end_matches('.').to_string();

            if self.forward_confirms(&trimmed, addr) {
                return FcrdnsResult::Confirmed { hostname: trimmed };
            }
        }

        FcrdnsResult::Unconfirmed
    }

    fn forward_confirms(&self, hostname: &str, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self
                .resolver
                .ipv4_lookup(hostname)
                .map(|lookup| lookup.iter().any(|ip| IpAddr::V4(*ip) == addr))
                .unwrap_or(false),
            IpAddr::V6(_) => self
                .resolver
                .ipv6_lookup(hostname)
                .map(|lookup| lookup.iter().any(|ip| IpAddr::V6((*ip).into()) == addr))
                .unwrap_or(false),
        }
    }
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Error kinds surfaced at the component boundary (§7 of the design).
//!
//! Internal helpers return `anyhow::Result`; `NivlheimError` is the
//! narrow, classified type that `Enroller`, `SessionGuard` and `Ingestor`
//! hand back to the front daemon, which already knows how to turn each
//! variant into a status code and a plaintext body.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NivlheimError {
    /// Missing or malformed request parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Non-loopback caller on ingest, path traversal attempt, revoked
    /// cert, expiring cert, hostname drift.
    #[error("{0}")]
    Forbidden(String),

    /// A queued archive (or its sidecar file) disappeared.
    #[error("{0}")]
    Gone(String),

    /// The CA signing lock is held by another enrollment in flight.
    /// Not a failure from the caller's point of view: the client is
    /// expected to retry.
    #[error("{0}")]
    Busy(String),

    /// Database unavailable, signing failure, unextractable archive,
    /// catastrophic I/O.
    #[error("{0}")]
    Internal(String),
}

impl NivlheimError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        NivlheimError::Internal(e.to_string())
    }
}

impl From<anyhow::Error> for NivlheimError {
    fn from(e: anyhow::Error) -> Self {
        NivlheimError::Internal(format!("{e:#}"))
    }
}

impl From<diesel::result::Error> for NivlheimError {
    fn from(e: diesel::result::Error) -> Self {
        NivlheimError::Internal(format!("database error: {e}"))
    }
}

impl From<r2d2::Error> for NivlheimError {
    fn from(e: r2d2::Error) -> Self {
        NivlheimError::Internal(format!("database pool exhausted: {e}"))
    }
}

// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Maps `NivlheimError` onto the status codes and plaintext bodies §7
//! specifies. `Busy` is deliberately a 200 — the spec calls it "200 with
//! retry text", not a failure from the caller's point of view.

use nivlheim_lib::error::NivlheimError;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use tracing::warn;

pub struct ApiError(pub NivlheimError);

impl From<NivlheimError> for ApiError {
    fn from(e: NivlheimError) -> Self {
        ApiError(e)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = match &self.0 {
            NivlheimError::BadRequest(msg) => (Status::BadRequest, msg.clone()),
            NivlheimError::Forbidden(msg) => (Status::Forbidden, msg.clone()),
            NivlheimError::Gone(msg) => (Status::Gone, msg.clone()),
            NivlheimError::Busy(msg) => (Status::Ok, msg.clone()),
            NivlheimError::Internal(msg) => {
                warn!(error = %msg, "internal error");
                (Status::InternalServerError, msg.clone())
            }
        };

        response::Response::build_from(body.respond_to(req)?)
            .status(status)
            .ok()
    }
}

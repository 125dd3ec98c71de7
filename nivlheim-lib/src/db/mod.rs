// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Pooled sqlite connection handling.
//!
//! The teacher holds a single `Rc<SqliteConnection>` per CLI invocation,
//! since `oca` is a short-lived single-threaded process. Nivlheim's front
//! daemon serves concurrent requests on a worker-per-request model (§5),
//! so the single connection is generalized to an `r2d2` pool — the
//! "database handle pool" §5 names as the one piece of state requests
//! legitimately share.

pub mod models;
pub mod schema;

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use anyhow::{Context, Result};

embed_migrations!("migrations");

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub fn new(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .with_context(|| format!("failed to open database pool at {database_url}"))?;

        let db = Self { pool };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get()?;
        embedded_migrations::run(&conn).context("failed to run pending migrations")?;
        Ok(())
    }

    pub fn get(&self) -> Result<Conn> {
        self.pool
            .get()
            .context("failed to acquire a connection from the database pool")
    }

    /// Run `f` inside one diesel transaction on a pooled connection.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        use diesel::Connection;

        let conn = self.get()?;
        conn.transaction::<T, anyhow::Error, _>(|| f(&conn).map_err(Into::into))
    }

    pub fn vacuum(&self) -> Result<()> {
        use diesel::RunQueryDsl;
        let conn = self.get()?;
        diesel::sql_query("VACUUM").execute(&conn)?;
        Ok(())
    }
}

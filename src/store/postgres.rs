//! PostgreSQL store over the synchronous `postgres` client.

use super::Store;
use crate::config::ConnectionParams;
use crate::decompose::{FieldRow, RecordRow, SubfieldRow};
use crate::error::Result;
use crate::schema::Engine;
use ::postgres::types::ToSql;
use ::postgres::{Client, Config, NoTls, Statement};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Connection to a PostgreSQL server.
pub struct PostgresStore {
    client: Client,
    statements: HashMap<String, Statement>,
    in_transaction: bool,
}

impl fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore")
            .field("prepared", &self.statements.len())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl PostgresStore {
    /// Connect using host, port, credentials and database name from `params`.
    ///
    /// Unset parameters fall back to libpq-style defaults of the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the login.
    pub fn connect(params: &ConnectionParams) -> Result<Self> {
        let mut config = Config::new();
        if let Some(host) = &params.host {
            config.host(host);
        }
        if let Some(port) = params.port {
            config.port(port);
        }
        if let Some(user) = &params.user {
            config.user(user);
        }
        if let Some(password) = &params.password {
            config.password(password);
        }
        if !params.database.is_empty() {
            config.dbname(&params.database);
        }
        debug!(
            host = params.host.as_deref().unwrap_or("localhost"),
            database = %params.database,
            "connecting to postgres"
        );
        Ok(Self::with_client(config.connect(NoTls)?))
    }

    /// Wrap an already connected client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        PostgresStore {
            client,
            statements: HashMap::new(),
            in_transaction: false,
        }
    }

    fn prepared(&mut self, sql: &str) -> Result<Statement> {
        if let Some(stmt) = self.statements.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(sql)?;
        self.statements.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }
}

impl Store for PostgresStore {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let row = self
            .client
            .query_one(Engine::Postgres.table_exists_sql(), &[&name])?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql)?;
        // DDL may invalidate cached plans.
        self.statements.clear();
        Ok(())
    }

    fn max_id(&mut self, sql: &str) -> Result<i64> {
        let row = self.client.query_one(sql, &[])?;
        let max: Option<i64> = row.get(0);
        Ok(max.unwrap_or(0))
    }

    fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn insert_records(&mut self, sql: &str, rows: &[RecordRow]) -> Result<()> {
        let stmt = self.prepared(sql)?;
        for row in rows {
            let mut values: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(2 + row.controls.len());
            values.push(&row.id);
            values.push(&row.leader);
            values.extend(row.controls.iter().map(|c| c as &(dyn ToSql + Sync)));
            self.client.execute(&stmt, &values)?;
        }
        Ok(())
    }

    fn insert_fields(&mut self, sql: &str, rows: &[FieldRow]) -> Result<()> {
        let stmt = self.prepared(sql)?;
        for row in rows {
            let indicator1 = row.indicator1.to_string();
            let indicator2 = row.indicator2.to_string();
            self.client.execute(
                &stmt,
                &[&row.id, &row.record_id, &row.tag, &indicator1, &indicator2],
            )?;
        }
        Ok(())
    }

    fn insert_subfields(&mut self, sql: &str, rows: &[SubfieldRow]) -> Result<()> {
        let stmt = self.prepared(sql)?;
        for row in rows {
            let code = row.code.to_string();
            self.client
                .execute(&stmt, &[&row.id, &row.field_id, &code, &row.data])?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK")?;
        self.in_transaction = false;
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        if self.in_transaction {
            self.commit()?;
        }
        self.client.close()?;
        Ok(())
    }
}

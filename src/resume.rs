//! Table preparation and surrogate key recovery.
//!
//! Before the first record is decomposed, each target table is either created,
//! dropped and recreated (overwrite), or kept, in which case its largest stored
//! id seeds the matching counter. A resumed run therefore continues numbering
//! after the last committed row of every table.

use crate::decompose::IdCounters;
use crate::error::{LoadError, Result};
use crate::schema::{Schema, Table};
use crate::store::Store;
use tracing::{info, warn};

/// What [`prepare_tables`] did to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    /// Table did not exist and was created.
    Created,
    /// Table existed and was dropped and recreated.
    Recreated,
    /// Table existed and its ids were recovered.
    Resumed {
        /// Largest id found
        max_id: i64,
    },
}

/// Make sure all three tables exist and return the counters to start from.
///
/// With `overwrite`, existing tables are dropped children first so no foreign
/// key still points at a dropped parent, then everything is created parents
/// first.
///
/// # Errors
///
/// Returns [`LoadError::DropFailed`] when `overwrite` is set and an existing
/// table cannot be dropped, or the store error for any other failed statement.
pub fn prepare_tables<S: Store>(
    store: &mut S,
    schema: &Schema,
    overwrite: bool,
) -> Result<(IdCounters, [TableAction; 3])> {
    let mut exists = [false; 3];
    for (slot, table) in Table::ALL.into_iter().enumerate() {
        exists[slot] = store.table_exists(schema.table_name(table))?;
    }

    if overwrite {
        for (slot, table) in Table::ALL.into_iter().enumerate().rev() {
            if !exists[slot] {
                continue;
            }
            let name = schema.table_name(table);
            warn!(table = name, "dropping existing table");
            store
                .execute(&schema.drop_sql(table))
                .map_err(|e| LoadError::DropFailed {
                    table: name.to_string(),
                    source: Box::new(e),
                })?;
        }
    }

    let mut counters = IdCounters::default();
    let mut actions = [TableAction::Created; 3];
    for (slot, table) in Table::ALL.into_iter().enumerate() {
        let action = match (exists[slot], overwrite) {
            (false, _) => {
                store.execute(&schema.create_sql(table))?;
                TableAction::Created
            },
            (true, true) => {
                store.execute(&schema.create_sql(table))?;
                TableAction::Recreated
            },
            (true, false) => {
                let max_id = store.max_id(&schema.max_id_sql(table))?;
                set_counter(&mut counters, table, max_id);
                TableAction::Resumed { max_id }
            },
        };
        info!(table = schema.table_name(table), action = ?action, "table ready");
        actions[slot] = action;
    }

    Ok((counters, actions))
}

/// Read the largest stored id of every table without changing anything.
///
/// Tables must exist.
///
/// # Errors
///
/// Returns the store error if a query fails.
pub fn recover_counters<S: Store>(store: &mut S, schema: &Schema) -> Result<IdCounters> {
    let mut counters = IdCounters::default();
    for table in Table::ALL {
        let max_id = store.max_id(&schema.max_id_sql(table))?;
        set_counter(&mut counters, table, max_id);
    }
    Ok(counters)
}

fn set_counter(counters: &mut IdCounters, table: Table, value: i64) {
    match table {
        Table::Records => counters.record = value,
        Table::Fields => counters.field = value,
        Table::Subfields => counters.subfield = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Engine, TableNames};
    use crate::store::SqliteStore;

    fn schema() -> Schema {
        Schema::new(Engine::Sqlite, TableNames::default())
    }

    #[test]
    fn test_fresh_database_creates_all_tables() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let (counters, actions) = prepare_tables(&mut store, &schema(), false).unwrap();
        assert_eq!(counters, IdCounters::default());
        assert_eq!(actions, [TableAction::Created; 3]);
        for name in ["marc_records", "marc_fields", "marc_subfields"] {
            assert!(store.table_exists(name).unwrap());
        }
    }

    #[test]
    fn test_existing_tables_recover_max_ids() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        prepare_tables(&mut store, &schema(), false).unwrap();
        store
            .execute(
                "INSERT INTO marc_records (id, leader) VALUES (4, 'x');
                 INSERT INTO marc_fields (id, record_id, tag) VALUES (9, 4, '245');
                 INSERT INTO marc_subfields (id, field_id, code, data) VALUES (17, 9, 'a', 'T');",
            )
            .unwrap();

        let (counters, actions) = prepare_tables(&mut store, &schema(), false).unwrap();
        assert_eq!(
            counters,
            IdCounters {
                record: 4,
                field: 9,
                subfield: 17
            }
        );
        assert_eq!(actions[0], TableAction::Resumed { max_id: 4 });
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        prepare_tables(&mut store, &schema(), false).unwrap();
        store
            .execute("INSERT INTO marc_records (id, leader) VALUES (12, 'x')")
            .unwrap();
        let first = recover_counters(&mut store, &schema()).unwrap();
        let second = recover_counters(&mut store, &schema()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.record, 12);
    }

    #[test]
    fn test_overwrite_drops_rows_and_resets_counters() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        prepare_tables(&mut store, &schema(), false).unwrap();
        store
            .execute("INSERT INTO marc_records (id, leader) VALUES (5, 'x')")
            .unwrap();

        let (counters, actions) = prepare_tables(&mut store, &schema(), true).unwrap();
        assert_eq!(counters, IdCounters::default());
        assert_eq!(actions, [TableAction::Recreated; 3]);
        assert_eq!(
            store
                .max_id(&schema().max_id_sql(Table::Records))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_overwrite_with_linked_rows_in_every_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        prepare_tables(&mut store, &schema(), false).unwrap();
        store
            .execute(
                "INSERT INTO marc_records (id, leader) VALUES (1, 'x'), (2, 'y');
                 INSERT INTO marc_fields (id, record_id, tag) VALUES (1, 1, '245'), (2, 2, '100');
                 INSERT INTO marc_subfields (id, field_id, code, data)
                     VALUES (1, 1, 'a', 'T'), (2, 2, 'a', 'A');",
            )
            .unwrap();

        let (counters, actions) = prepare_tables(&mut store, &schema(), true).unwrap();
        assert_eq!(counters, IdCounters::default());
        assert_eq!(actions, [TableAction::Recreated; 3]);
        let after = recover_counters(&mut store, &schema()).unwrap();
        assert_eq!(after, IdCounters::default());
    }

    #[test]
    fn test_overwrite_creates_missing_tables() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.execute(&schema().create_sql(Table::Records)).unwrap();

        let (_, actions) = prepare_tables(&mut store, &schema(), true).unwrap();
        assert_eq!(
            actions,
            [
                TableAction::Recreated,
                TableAction::Created,
                TableAction::Created
            ]
        );
    }

    /// Delegates to SQLite but refuses every `DROP`.
    struct UndroppableStore(SqliteStore);

    impl Store for UndroppableStore {
        fn engine(&self) -> Engine {
            self.0.engine()
        }
        fn table_exists(&mut self, name: &str) -> Result<bool> {
            self.0.table_exists(name)
        }
        fn execute(&mut self, sql: &str) -> Result<()> {
            if sql.starts_with("DROP") {
                return Err(LoadError::Config("referenced by other objects".to_string()));
            }
            self.0.execute(sql)
        }
        fn max_id(&mut self, sql: &str) -> Result<i64> {
            self.0.max_id(sql)
        }
        fn begin(&mut self) -> Result<()> {
            self.0.begin()
        }
        fn insert_records(&mut self, sql: &str, rows: &[crate::RecordRow]) -> Result<()> {
            self.0.insert_records(sql, rows)
        }
        fn insert_fields(&mut self, sql: &str, rows: &[crate::FieldRow]) -> Result<()> {
            self.0.insert_fields(sql, rows)
        }
        fn insert_subfields(&mut self, sql: &str, rows: &[crate::SubfieldRow]) -> Result<()> {
            self.0.insert_subfields(sql, rows)
        }
        fn commit(&mut self) -> Result<()> {
            self.0.commit()
        }
        fn rollback(&mut self) -> Result<()> {
            self.0.rollback()
        }
        fn close(self) -> Result<()> {
            self.0.close()
        }
    }

    #[test]
    fn test_failed_drop_is_fatal() {
        let mut inner = SqliteStore::open_in_memory().unwrap();
        prepare_tables(&mut inner, &schema(), false).unwrap();
        let mut store = UndroppableStore(inner);

        let err = prepare_tables(&mut store, &schema(), true).unwrap_err();
        match err {
            LoadError::DropFailed { table, .. } => assert_eq!(table, "marc_subfields"),
            other => panic!("unexpected error {other}"),
        }
    }
}

//! Static description of the three target tables and the SQL needed for them.
//!
//! The table layout is fixed; only the table names and the engine dialect vary.
//! Everything here is pure string construction.

use crate::error::{LoadError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Control tags stored as dedicated columns on the records table.
pub const CONTROL_TAGS: [&str; 10] = [
    "000", "001", "002", "003", "004", "005", "006", "007", "008", "009",
];

/// Default names of the three tables.
pub const DEFAULT_RECORDS_TABLE: &str = "marc_records";
/// Default name of the fields table.
pub const DEFAULT_FIELDS_TABLE: &str = "marc_fields";
/// Default name of the subfields table.
pub const DEFAULT_SUBFIELDS_TABLE: &str = "marc_subfields";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
}

/// Supported target engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Embedded, file-backed SQLite
    Sqlite,
    /// Client-server PostgreSQL
    Postgres,
}

impl FromStr for Engine {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            other => Err(LoadError::Config(format!("unsupported database type: {other}"))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Sqlite => write!(f, "sqlite"),
            Engine::Postgres => write!(f, "postgres"),
        }
    }
}

/// How an engine spells statement parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?, ?, ?`
    Positional,
    /// `$1, $2, $3`
    Numbered,
}

impl Placeholder {
    fn list(self, count: usize) -> String {
        (1..=count)
            .map(|n| match self {
                Placeholder::Positional => "?".to_string(),
                Placeholder::Numbered => format!("${n}"),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Engine {
    /// Parameter style used by this engine's driver.
    #[must_use]
    pub fn placeholder(self) -> Placeholder {
        match self {
            Engine::Sqlite => Placeholder::Positional,
            Engine::Postgres => Placeholder::Numbered,
        }
    }

    /// Query returning the number of tables named by its single parameter.
    ///
    /// PostgreSQL folds unquoted identifiers to lower case, so the name is
    /// folded the same way before comparing.
    #[must_use]
    pub fn table_exists_sql(self) -> &'static str {
        match self {
            Engine::Sqlite => "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?",
            Engine::Postgres => {
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema=current_schema() AND table_name=lower($1::text)"
            },
        }
    }

    /// Column type for surrogate and foreign keys.
    fn key_type(self) -> &'static str {
        match self {
            // INTEGER PRIMARY KEY is SQLite's 64-bit rowid alias.
            Engine::Sqlite => "INTEGER",
            Engine::Postgres => "BIGINT",
        }
    }

    fn drop_sql(self, table: &str) -> String {
        match self {
            Engine::Sqlite => format!("DROP TABLE {table}"),
            Engine::Postgres => format!("DROP TABLE {table} CASCADE"),
        }
    }
}

/// One of the three fixed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// One row per record
    Records,
    /// One row per data field
    Fields,
    /// One row per subfield
    Subfields,
}

impl Table {
    /// Parent-before-child order used for creation and inserts.
    pub const ALL: [Table; 3] = [Table::Records, Table::Fields, Table::Subfields];

    /// Column names in insert order.
    #[must_use]
    pub fn columns(self) -> Vec<String> {
        match self {
            Table::Records => {
                let mut cols = vec!["id".to_string(), "leader".to_string()];
                cols.extend(CONTROL_TAGS.iter().map(|tag| format!("c{tag}")));
                cols
            },
            Table::Fields => ["id", "record_id", "tag", "indicator_1", "indicator_2"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            Table::Subfields => ["id", "field_id", "code", "data"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Caller-configurable names of the three tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableNames {
    /// Records (header) table
    pub records: String,
    /// Fields table
    pub fields: String,
    /// Subfields table
    pub subfields: String,
}

impl Default for TableNames {
    fn default() -> Self {
        TableNames {
            records: DEFAULT_RECORDS_TABLE.to_string(),
            fields: DEFAULT_FIELDS_TABLE.to_string(),
            subfields: DEFAULT_SUBFIELDS_TABLE.to_string(),
        }
    }
}

impl TableNames {
    /// Build table names, checking that each is a plain SQL identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Config`] for a name that is not an identifier, or
    /// when two tables share a name.
    pub fn new(records: &str, fields: &str, subfields: &str) -> Result<Self> {
        for name in [records, fields, subfields] {
            if !IDENTIFIER.is_match(name) {
                return Err(LoadError::Config(format!("invalid table name: {name:?}")));
            }
        }
        if records == fields || records == subfields || fields == subfields {
            return Err(LoadError::Config("table names must be distinct".to_string()));
        }
        Ok(TableNames {
            records: records.to_string(),
            fields: fields.to_string(),
            subfields: subfields.to_string(),
        })
    }

    /// Name configured for `table`.
    #[must_use]
    pub fn name(&self, table: Table) -> &str {
        match table {
            Table::Records => &self.records,
            Table::Fields => &self.fields,
            Table::Subfields => &self.subfields,
        }
    }
}

/// Table names plus engine dialect: every statement the loader issues.
#[derive(Debug, Clone)]
pub struct Schema {
    engine: Engine,
    names: TableNames,
}

impl Schema {
    /// Create a schema for `engine` over `names`.
    #[must_use]
    pub fn new(engine: Engine, names: TableNames) -> Self {
        Schema { engine, names }
    }

    /// Target engine.
    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Configured table names.
    #[must_use]
    pub fn names(&self) -> &TableNames {
        &self.names
    }

    /// Name configured for `table`.
    #[must_use]
    pub fn table_name(&self, table: Table) -> &str {
        self.names.name(table)
    }

    fn column_defs(&self, table: Table) -> Vec<String> {
        let key = self.engine.key_type();
        match table {
            Table::Records => {
                let mut defs = vec![
                    format!("id {key} PRIMARY KEY"),
                    "leader TEXT NOT NULL".to_string(),
                ];
                defs.extend(CONTROL_TAGS.iter().map(|tag| format!("c{tag} TEXT")));
                defs
            },
            Table::Fields => vec![
                format!("id {key} PRIMARY KEY"),
                format!("record_id {key} REFERENCES {} (id)", self.names.records),
                "tag CHAR(3) NOT NULL".to_string(),
                "indicator_1 CHAR NOT NULL DEFAULT ''".to_string(),
                "indicator_2 CHAR NOT NULL DEFAULT ''".to_string(),
            ],
            Table::Subfields => vec![
                format!("id {key} PRIMARY KEY"),
                format!("field_id {key} REFERENCES {} (id)", self.names.fields),
                "code CHAR NOT NULL".to_string(),
                "data TEXT NOT NULL".to_string(),
            ],
        }
    }

    /// `CREATE TABLE` statement for `table`.
    #[must_use]
    pub fn create_sql(&self, table: Table) -> String {
        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.table_name(table),
            self.column_defs(table).join(",\n  ")
        )
    }

    /// `INSERT` template for `table` with one placeholder per column.
    #[must_use]
    pub fn insert_sql(&self, table: Table) -> String {
        let columns = table.columns();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name(table),
            columns.join(","),
            self.engine.placeholder().list(columns.len())
        )
    }

    /// `DROP TABLE` statement for `table`.
    #[must_use]
    pub fn drop_sql(&self, table: Table) -> String {
        self.engine.drop_sql(self.table_name(table))
    }

    /// Query for the largest surrogate key stored in `table`.
    #[must_use]
    pub fn max_id_sql(&self, table: Table) -> String {
        format!("SELECT max(id) FROM {}", self.table_name(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(engine: Engine) -> Schema {
        Schema::new(engine, TableNames::default())
    }

    #[test]
    fn test_records_insert_has_twelve_placeholders() {
        let sql = schema(Engine::Sqlite).insert_sql(Table::Records);
        assert_eq!(
            sql,
            "INSERT INTO marc_records (id,leader,c000,c001,c002,c003,c004,c005,c006,c007,c008,c009) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?)"
        );
    }

    #[test]
    fn test_postgres_numbered_placeholders() {
        let sql = schema(Engine::Postgres).insert_sql(Table::Subfields);
        assert_eq!(
            sql,
            "INSERT INTO marc_subfields (id,field_id,code,data) VALUES ($1,$2,$3,$4)"
        );
    }

    #[test]
    fn test_create_wires_foreign_keys_by_name() {
        let names = TableNames::new("recs", "flds", "subs").unwrap();
        let schema = Schema::new(Engine::Sqlite, names);
        let fields = schema.create_sql(Table::Fields);
        assert!(fields.starts_with("CREATE TABLE flds ("));
        assert!(fields.contains("record_id INTEGER REFERENCES recs (id)"));
        assert!(fields.contains("indicator_1 CHAR NOT NULL DEFAULT ''"));
        let subfields = schema.create_sql(Table::Subfields);
        assert!(subfields.contains("field_id INTEGER REFERENCES flds (id)"));
        assert!(subfields.contains("data TEXT NOT NULL"));
    }

    #[test]
    fn test_postgres_uses_bigint_keys_and_cascade() {
        let schema = schema(Engine::Postgres);
        assert!(schema
            .create_sql(Table::Records)
            .contains("id BIGINT PRIMARY KEY"));
        assert_eq!(
            schema.drop_sql(Table::Records),
            "DROP TABLE marc_records CASCADE"
        );
        assert_eq!(
            Schema::new(Engine::Sqlite, TableNames::default()).drop_sql(Table::Fields),
            "DROP TABLE marc_fields"
        );
    }

    #[test]
    fn test_create_records_has_control_columns() {
        let sql = schema(Engine::Sqlite).create_sql(Table::Records);
        for tag in CONTROL_TAGS {
            assert!(sql.contains(&format!("c{tag} TEXT")), "missing c{tag}");
        }
    }

    #[test]
    fn test_table_names_validation() {
        assert!(TableNames::new("a", "b", "c").is_ok());
        assert!(TableNames::new("bad name", "b", "c").is_err());
        assert!(TableNames::new("a; DROP", "b", "c").is_err());
        assert!(TableNames::new("1abc", "b", "c").is_err());
        assert!(TableNames::new("a", "a", "c").is_err());
    }

    #[test]
    fn test_engine_from_str() {
        assert_eq!("sqlite".parse::<Engine>().unwrap(), Engine::Sqlite);
        assert_eq!("PostgreSQL".parse::<Engine>().unwrap(), Engine::Postgres);
        assert!("mysql".parse::<Engine>().is_err());
    }
}

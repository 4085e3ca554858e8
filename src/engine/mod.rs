// dblocalsync/src/engine/mod.rs
//
// The two surfaces through which the tool talks to the database engine:
// the ODBC-style driver surface for SQL work, and the automation surface
// for administrative operations (database creation, passwords, linked
// table maintenance). Concrete backends live in submodules; everything
// above this module is backend-agnostic.

#[cfg(windows)]
pub mod access;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use chrono::NaiveDateTime;

/// A single driver-typed cell value, copied verbatim between databases.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// One row, in the source table's native column order.
pub type Record = Vec<Value>;

/// One column as reported by schema introspection. Fields the driver does
/// not report get defaults at introspection time: `size` is `None`,
/// `nullable` is `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub driver_type: String,
    pub size: Option<i32>,
    pub nullable: bool,
}

/// The main table's schema, columns in native order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStructure {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// One table definition as reported by the automation surface. `connect`
/// is present only for linked tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub connect: Option<String>,
}

/// Driver surface: one open connection to a database file. An empty
/// password means the file is unprotected. Connections are closed on drop.
pub trait EngineConnection {
    /// User table names (type TABLE), in the driver's enumeration order.
    fn table_names(&mut self) -> Result<Vec<String>>;

    /// Column descriptors for `table`, in native column order.
    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Executes a statement that returns no rows (DDL, etc.).
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Executes a query and fetches all resulting rows.
    fn query(&mut self, sql: &str) -> Result<Vec<Record>>;

    /// Executes a statement with positional `?` parameters.
    fn execute_with_params(&mut self, sql: &str, params: &[Value]) -> Result<()>;

    fn commit(&mut self) -> Result<()>;
}

/// Automation surface: the engine's administration interface. At most one
/// database is open per session, and the session itself must be released
/// after use; see [`SessionGuard`].
pub trait AutomationSession {
    /// Creates a new empty database file and releases it again.
    fn create_database(&mut self, path: &str) -> Result<()>;

    /// Changes the password of the currently open database.
    fn set_database_password(&mut self, old_password: &str, new_password: &str) -> Result<()>;

    fn open_database(&mut self, path: &str, exclusive: bool, password: &str) -> Result<()>;

    /// All table definitions of the currently open database.
    fn table_defs(&mut self) -> Result<Vec<TableDef>>;

    /// Replaces the connection string of a linked table.
    fn update_table_connect(&mut self, table: &str, connect: &str) -> Result<()>;

    /// Refreshes a linked table's cached link metadata.
    fn refresh_link(&mut self, table: &str) -> Result<()>;

    fn close_database(&mut self) -> Result<()>;

    /// Releases the session itself. Called by [`SessionGuard`] on drop.
    fn quit(&mut self) -> Result<()>;
}

/// Factory for the two surfaces.
pub trait Engine {
    fn connect(&self, path: &str, password: &str) -> Result<Box<dyn EngineConnection>>;
    fn open_session(&self) -> Result<SessionGuard>;
}

/// Scoped automation session. The underlying session is quit when the
/// guard goes out of scope, on success and error paths alike, so an
/// exclusive file handle is never leaked past the operation that opened it.
pub struct SessionGuard {
    session: Box<dyn AutomationSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = dyn AutomationSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl std::ops::DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.session.quit() {
            eprintln!("⚠ Failed to release automation session: {e:#}");
        }
    }
}

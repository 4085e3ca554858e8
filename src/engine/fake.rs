// dblocalsync/src/engine/fake.rs
//
// In-memory test double for the engine surfaces. Understands exactly the
// SQL this crate emits: CREATE TABLE, SELECT TOP n (optionally ordered
// descending), and positional INSERT.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;

use super::{
    AutomationSession, ColumnDescriptor, Engine, EngineConnection, Record, SessionGuard, TableDef,
    Value,
};

#[derive(Debug, Default, Clone)]
pub struct FakeTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Record>,
    pub connect: Option<String>,
    pub refresh_count: usize,
    /// Failure injection for insert/refresh paths.
    pub reject_inserts: bool,
    pub fail_refresh: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FakeDatabase {
    pub password: String,
    pub tables: Vec<FakeTable>,
}

#[derive(Debug, Default)]
struct FakeState {
    databases: HashMap<String, FakeDatabase>,
    sessions_quit: usize,
}

/// Shared-state fake engine. With `touch_files` enabled, created databases
/// also leave an empty file on disk so existence gates can be exercised
/// with tempdir paths.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Rc<RefCell<FakeState>>,
    touch_files: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_touch_files() -> Self {
        Self {
            touch_files: true,
            ..Self::default()
        }
    }

    pub fn add_database(&self, path: &str, db: FakeDatabase) {
        self.state
            .borrow_mut()
            .databases
            .insert(path.to_string(), db);
    }

    pub fn database(&self, path: &str) -> Option<FakeDatabase> {
        self.state.borrow().databases.get(path).cloned()
    }

    pub fn sessions_quit(&self) -> usize {
        self.state.borrow().sessions_quit
    }
}

impl Engine for FakeEngine {
    fn connect(&self, path: &str, password: &str) -> Result<Box<dyn EngineConnection>> {
        {
            let state = self.state.borrow();
            let db = state
                .databases
                .get(path)
                .with_context(|| format!("no database at {path}"))?;
            if db.password != password {
                bail!("invalid password for {path}");
            }
        }
        Ok(Box::new(FakeConnection {
            state: Rc::clone(&self.state),
            path: path.to_string(),
        }))
    }

    fn open_session(&self) -> Result<SessionGuard> {
        Ok(SessionGuard::new(Box::new(FakeSession {
            state: Rc::clone(&self.state),
            touch_files: self.touch_files,
            open: None,
        })))
    }
}

struct FakeConnection {
    state: Rc<RefCell<FakeState>>,
    path: String,
}

impl FakeConnection {
    fn with_db<R>(&self, f: impl FnOnce(&mut FakeDatabase) -> Result<R>) -> Result<R> {
        let mut state = self.state.borrow_mut();
        let db = state
            .databases
            .get_mut(&self.path)
            .with_context(|| format!("database removed: {}", self.path))?;
        f(db)
    }
}

impl EngineConnection for FakeConnection {
    fn table_names(&mut self) -> Result<Vec<String>> {
        self.with_db(|db| Ok(db.tables.iter().map(|t| t.name.clone()).collect()))
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.with_db(|db| Ok(find_table(db, table)?.columns.clone()))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        let table = parse_create_table(sql)?;
        self.with_db(|db| {
            if db.tables.iter().any(|t| t.name == table.name) {
                bail!("table already exists: {}", table.name);
            }
            db.tables.push(table);
            Ok(())
        })
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Record>> {
        let select = parse_select_top(sql)?;
        self.with_db(|db| {
            let table = find_table(db, &select.table)?;
            let mut rows = table.rows.clone();
            if let Some(col) = &select.order_by {
                let idx = table
                    .columns
                    .iter()
                    .position(|c| &c.name == col)
                    .with_context(|| format!("no column {col} in {}", select.table))?;
                rows.sort_by(|a, b| compare_values(&b[idx], &a[idx]));
            }
            rows.truncate(select.limit);
            Ok(rows)
        })
    }

    fn execute_with_params(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let insert = parse_insert(sql)?;
        self.with_db(|db| {
            let table = find_table_mut(db, &insert.table)?;
            if table.reject_inserts {
                bail!("insert rejected by test configuration");
            }
            if params.len() != insert.columns.len() {
                bail!(
                    "parameter count mismatch: {} placeholders, {} values",
                    insert.columns.len(),
                    params.len()
                );
            }
            table.rows.push(params.to_vec());
            Ok(())
        })
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FakeSession {
    state: Rc<RefCell<FakeState>>,
    touch_files: bool,
    open: Option<String>,
}

impl FakeSession {
    fn open_path(&self) -> Result<String> {
        self.open.clone().context("no database open")
    }

    fn with_open_db<R>(&self, f: impl FnOnce(&mut FakeDatabase) -> Result<R>) -> Result<R> {
        let path = self.open_path()?;
        let mut state = self.state.borrow_mut();
        let db = state
            .databases
            .get_mut(&path)
            .with_context(|| format!("database removed: {path}"))?;
        f(db)
    }
}

impl AutomationSession for FakeSession {
    fn create_database(&mut self, path: &str) -> Result<()> {
        if self.touch_files && Path::new(path).exists() {
            bail!("file already exists: {path}");
        }
        self.state
            .borrow_mut()
            .databases
            .insert(path.to_string(), FakeDatabase::default());
        if self.touch_files {
            std::fs::write(path, b"")?;
        }
        Ok(())
    }

    fn set_database_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let old_password = old_password.to_string();
        let new_password = new_password.to_string();
        self.with_open_db(|db| {
            if db.password != old_password {
                bail!("old password does not match");
            }
            db.password = new_password;
            Ok(())
        })
    }

    fn open_database(&mut self, path: &str, _exclusive: bool, password: &str) -> Result<()> {
        {
            let state = self.state.borrow();
            let db = state
                .databases
                .get(path)
                .with_context(|| format!("no database at {path}"))?;
            if db.password != password {
                bail!("invalid password for {path}");
            }
        }
        self.open = Some(path.to_string());
        Ok(())
    }

    fn table_defs(&mut self) -> Result<Vec<TableDef>> {
        self.with_open_db(|db| {
            Ok(db
                .tables
                .iter()
                .map(|t| TableDef {
                    name: t.name.clone(),
                    connect: t.connect.clone(),
                })
                .collect())
        })
    }

    fn update_table_connect(&mut self, table: &str, connect: &str) -> Result<()> {
        let connect = connect.to_string();
        let table = table.to_string();
        self.with_open_db(|db| {
            find_table_mut(db, &table)?.connect = Some(connect);
            Ok(())
        })
    }

    fn refresh_link(&mut self, table: &str) -> Result<()> {
        let table = table.to_string();
        self.with_open_db(|db| {
            let t = find_table_mut(db, &table)?;
            if t.fail_refresh {
                bail!("link refresh rejected by test configuration");
            }
            t.refresh_count += 1;
            Ok(())
        })
    }

    fn close_database(&mut self) -> Result<()> {
        self.open = None;
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        self.open = None;
        self.state.borrow_mut().sessions_quit += 1;
        Ok(())
    }
}

fn find_table<'a>(db: &'a FakeDatabase, name: &str) -> Result<&'a FakeTable> {
    db.tables
        .iter()
        .find(|t| t.name == name)
        .with_context(|| format!("no table {name}"))
}

fn find_table_mut<'a>(db: &'a mut FakeDatabase, name: &str) -> Result<&'a mut FakeTable> {
    db.tables
        .iter_mut()
        .find(|t| t.name == name)
        .with_context(|| format!("no table {name}"))
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

struct SelectTop {
    table: String,
    limit: usize,
    order_by: Option<String>,
}

struct Insert {
    table: String,
    columns: Vec<String>,
}

fn parse_create_table(sql: &str) -> Result<FakeTable> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^CREATE TABLE \[([^\]]+)\] \((.+)\)$").unwrap());
    let caps = re
        .captures(sql)
        .with_context(|| format!("unsupported statement: {sql}"))?;

    static COL: OnceLock<Regex> = OnceLock::new();
    let col_re = COL.get_or_init(|| {
        Regex::new(r"\[([^\]]+)\] ([A-Z]+(?:\((\d+)\))?)( NOT NULL)?").unwrap()
    });

    let mut columns = Vec::new();
    for c in col_re.captures_iter(&caps[2]) {
        columns.push(ColumnDescriptor {
            name: c[1].to_string(),
            // DDL keyword rather than a driver type name; close enough for
            // a test double.
            driver_type: c[2].to_string(),
            size: c.get(3).map(|m| m.as_str().parse().unwrap()),
            nullable: c.get(4).is_none(),
        });
    }
    if columns.is_empty() {
        bail!("no column definitions in: {sql}");
    }

    Ok(FakeTable {
        name: caps[1].to_string(),
        columns,
        ..Default::default()
    })
}

fn parse_select_top(sql: &str) -> Result<SelectTop> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^SELECT TOP (\d+) \* FROM \[([^\]]+)\](?: ORDER BY \[([^\]]+)\] DESC)?$")
            .unwrap()
    });
    let caps = re
        .captures(sql)
        .with_context(|| format!("unsupported query: {sql}"))?;
    Ok(SelectTop {
        table: caps[2].to_string(),
        limit: caps[1].parse()?,
        order_by: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

fn parse_insert(sql: &str) -> Result<Insert> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^INSERT INTO \[([^\]]+)\] \((.+)\) VALUES \((.+)\)$").unwrap()
    });
    let caps = re
        .captures(sql)
        .with_context(|| format!("unsupported statement: {sql}"))?;
    let columns = caps[2]
        .split(", ")
        .map(|c| c.trim_matches(['[', ']']).to_string())
        .collect();
    Ok(Insert {
        table: caps[1].to_string(),
        columns,
    })
}

/// Shorthand for building fake columns in tests.
pub fn column(name: &str, driver_type: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        driver_type: driver_type.to_string(),
        size: None,
        nullable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(day: u32) -> Value {
        Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_query_orders_by_datetime_descending() -> Result<()> {
        let engine = FakeEngine::new();
        engine.add_database(
            "a.mdb",
            FakeDatabase {
                tables: vec![FakeTable {
                    name: "T".to_string(),
                    columns: vec![column("Fecha", "DATETIME")],
                    rows: vec![vec![date(1)], vec![date(3)], vec![date(2)]],
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        let mut conn = engine.connect("a.mdb", "")?;
        let rows = conn.query("SELECT TOP 2 * FROM [T] ORDER BY [Fecha] DESC")?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], date(3));
        assert_eq!(rows[1][0], date(2));
        Ok(())
    }

    #[test]
    fn test_insert_accepts_every_value_kind() -> Result<()> {
        let engine = FakeEngine::new();
        engine.add_database("a.mdb", FakeDatabase::default());
        let mut conn = engine.connect("a.mdb", "")?;
        conn.execute(
            "CREATE TABLE [T] ([N] INTEGER, [X] DOUBLE, [B] YESNO, \
             [S] TEXT(10), [D] DATETIME, [R] LONGBINARY)",
        )?;

        let record = vec![
            Value::Null,
            Value::Double(1.5),
            Value::Bool(true),
            Value::Text("x".to_string()),
            date(1),
            Value::Bytes(vec![1, 2, 3]),
        ];
        conn.execute_with_params(
            "INSERT INTO [T] ([N], [X], [B], [S], [D], [R]) VALUES (?, ?, ?, ?, ?, ?)",
            &record,
        )?;
        conn.commit()?;

        let db = engine.database("a.mdb").unwrap();
        assert_eq!(db.tables[0].columns.len(), 6);
        assert_eq!(db.tables[0].rows, vec![record]);
        Ok(())
    }

    #[test]
    fn test_parameter_count_mismatch_is_an_error() -> Result<()> {
        let engine = FakeEngine::new();
        engine.add_database("a.mdb", FakeDatabase::default());
        let mut conn = engine.connect("a.mdb", "")?;
        conn.execute("CREATE TABLE [T] ([N] INTEGER)")?;

        let result = conn.execute_with_params("INSERT INTO [T] ([N]) VALUES (?)", &[]);
        assert!(result.is_err());
        Ok(())
    }
}

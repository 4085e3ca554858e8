// dblocalsync/src/engine/access.rs
//
// Windows backend. The driver surface speaks ODBC through the Microsoft
// Access driver; the automation surface drives the Access application
// itself over COM late binding, which is the only interface that exposes
// database creation, password assignment, and linked-table refresh.

use anyhow::{Context, Result};
use odbc_api::parameter::InputParameter;
use odbc_api::{
    Connection, ConnectionOptions, Cursor, CursorRow, DataType, IntoParameter, ResultSetMetadata,
};

use super::{
    AutomationSession, ColumnDescriptor, Engine, EngineConnection, Record, SessionGuard, Value,
};

const ODBC_DRIVER: &str = "{Microsoft Access Driver (*.mdb, *.accdb)}";

pub struct AccessEngine {
    environment: &'static odbc_api::Environment,
}

impl AccessEngine {
    pub fn new() -> Result<Self> {
        let environment =
            odbc_api::environment().context("Failed to initialize the ODBC environment")?;
        Ok(Self { environment })
    }
}

impl Engine for AccessEngine {
    fn connect(&self, path: &str, password: &str) -> Result<Box<dyn EngineConnection>> {
        let connection_string = format!("DRIVER={ODBC_DRIVER};DBQ={path};PWD={password};");
        let connection = self
            .environment
            .connect_with_connection_string(&connection_string, ConnectionOptions::default())
            .with_context(|| format!("Failed to connect to {path}"))?;
        connection
            .set_autocommit(false)
            .context("Failed to disable autocommit")?;
        Ok(Box::new(OdbcConnection { connection }))
    }

    fn open_session(&self) -> Result<SessionGuard> {
        Ok(SessionGuard::new(Box::new(com::AccessSession::new()?)))
    }
}

struct OdbcConnection {
    connection: Connection<'static>,
}

impl EngineConnection for OdbcConnection {
    fn table_names(&mut self) -> Result<Vec<String>> {
        // TABLE_NAME is column 3 of the SQLTables result set.
        let mut cursor = self
            .connection
            .tables("", "", "", "TABLE")
            .context("Failed to enumerate tables")?;
        let mut names = Vec::new();
        while let Some(mut row) = cursor.next_row()? {
            if let Some(name) = text_at(&mut row, 3)? {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        // SQLColumns result set: 4 = COLUMN_NAME, 6 = TYPE_NAME,
        // 7 = COLUMN_SIZE, 11 = NULLABLE (0 = no nulls).
        let mut cursor = self
            .connection
            .columns("", "", table, "%")
            .with_context(|| format!("Failed to enumerate columns of {table}"))?;
        let mut columns = Vec::new();
        while let Some(mut row) = cursor.next_row()? {
            let name = text_at(&mut row, 4)?.unwrap_or_default();
            let driver_type = text_at(&mut row, 6)?.unwrap_or_default();
            let size = text_at(&mut row, 7)?.and_then(|s| s.parse().ok());
            // Unknown nullability counts as nullable.
            let nullable = text_at(&mut row, 11)?.is_none_or(|v| v != "0");
            columns.push(ColumnDescriptor {
                name,
                driver_type,
                size,
                nullable,
            });
        }
        Ok(columns)
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.connection
            .execute(sql, ())
            .with_context(|| format!("Failed to execute: {sql}"))?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        if let Some(mut cursor) = self
            .connection
            .execute(sql, ())
            .with_context(|| format!("Failed to execute: {sql}"))?
        {
            let cols = cursor.num_result_cols()? as u16;
            // Binary columns are fetched as raw bytes so attachments stay
            // byte-identical; everything else travels as text and the
            // driver converts back on insert.
            let mut is_binary = Vec::with_capacity(cols as usize);
            for col in 1..=cols {
                is_binary.push(matches!(
                    cursor.col_data_type(col)?,
                    DataType::Binary { .. }
                        | DataType::Varbinary { .. }
                        | DataType::LongVarbinary { .. }
                ));
            }
            while let Some(mut row) = cursor.next_row()? {
                let mut record = Record::with_capacity(cols as usize);
                for col in 1..=cols {
                    let value = if is_binary[usize::from(col - 1)] {
                        match bytes_at(&mut row, col)? {
                            Some(bytes) => Value::Bytes(bytes),
                            None => Value::Null,
                        }
                    } else {
                        match text_at(&mut row, col)? {
                            Some(text) => Value::Text(text),
                            None => Value::Null,
                        }
                    };
                    record.push(value);
                }
                records.push(record);
            }
        }
        Ok(records)
    }

    fn execute_with_params(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let params: Vec<Box<dyn InputParameter>> = params.iter().map(to_parameter).collect();
        self.connection
            .execute(sql, params.as_slice())
            .with_context(|| format!("Failed to execute: {sql}"))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.connection.commit().context("Failed to commit")
    }
}

fn text_at(row: &mut CursorRow<'_>, col: u16) -> Result<Option<String>> {
    let mut buf = Vec::new();
    if !row.get_text(col, &mut buf)? {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn bytes_at(row: &mut CursorRow<'_>, col: u16) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    if !row.get_binary(col, &mut buf)? {
        return Ok(None);
    }
    Ok(Some(buf))
}

fn to_parameter(value: &Value) -> Box<dyn InputParameter> {
    match value {
        Value::Null => Box::new(Option::<String>::None.into_parameter()),
        Value::Int(v) => Box::new((*v).into_parameter()),
        Value::Double(v) => Box::new((*v).into_parameter()),
        Value::Bool(v) => Box::new((*v).into_parameter()),
        Value::Text(v) => Box::new(v.clone().into_parameter()),
        Value::DateTime(v) => {
            Box::new(v.format("%Y-%m-%d %H:%M:%S").to_string().into_parameter())
        }
        Value::Bytes(v) => Box::new(v.clone().into_parameter()),
    }
}

mod com {
    use anyhow::{Context, Result};
    use windows::Win32::Globalization::GetUserDefaultLCID;
    use windows::Win32::System::Com::{
        CLSCTX_LOCAL_SERVER, CLSIDFromProgID, COINIT_APARTMENTTHREADED, CoCreateInstance,
        CoInitializeEx, CoUninitialize, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
        DISPATCH_PROPERTYPUT, DISPPARAMS, IDispatch,
    };
    use windows::Win32::System::Ole::DISPID_PROPERTYPUT;
    use windows::core::{BSTR, GUID, HSTRING, PCWSTR, VARIANT};

    use crate::engine::{AutomationSession, TableDef};

    /// One running instance of the engine's automation application,
    /// holding at most one open database.
    pub(super) struct AccessSession {
        app: IDispatch,
    }

    impl AccessSession {
        pub(super) fn new() -> Result<Self> {
            unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }
                .ok()
                .context("Failed to initialize COM")?;
            let clsid = unsafe { CLSIDFromProgID(&HSTRING::from("Access.Application")) }
                .context("Automation application is not registered")?;
            let app: IDispatch = unsafe { CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER) }
                .context("Failed to start the automation application")?;
            invoke(&app, "Visible", DISPATCH_PROPERTYPUT, &[VARIANT::from(false)])?;
            Ok(Self { app })
        }

        fn current_db(&self) -> Result<IDispatch> {
            let db = invoke(&self.app, "CurrentDb", DISPATCH_METHOD, &[])?;
            IDispatch::try_from(&db).context("CurrentDb did not return an object")
        }

        fn table_def(&self, table: &str) -> Result<IDispatch> {
            let db = self.current_db()?;
            let defs = invoke(&db, "TableDefs", DISPATCH_PROPERTYGET, &[])?;
            let defs = IDispatch::try_from(&defs).context("TableDefs is not a collection")?;
            let item = invoke(&defs, "Item", DISPATCH_METHOD, &[VARIANT::from(table)])?;
            IDispatch::try_from(&item).with_context(|| format!("No table definition {table}"))
        }
    }

    impl AutomationSession for AccessSession {
        fn create_database(&mut self, path: &str) -> Result<()> {
            invoke(
                &self.app,
                "NewCurrentDatabase",
                DISPATCH_METHOD,
                &[VARIANT::from(path)],
            )?;
            // Release the new file right away; callers reopen it in a
            // separate cycle.
            invoke(&self.app, "CloseCurrentDatabase", DISPATCH_METHOD, &[])?;
            Ok(())
        }

        fn set_database_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
            let db = self.current_db()?;
            invoke(
                &db,
                "NewPassword",
                DISPATCH_METHOD,
                &[VARIANT::from(old_password), VARIANT::from(new_password)],
            )?;
            Ok(())
        }

        fn open_database(&mut self, path: &str, exclusive: bool, password: &str) -> Result<()> {
            let mut args = vec![VARIANT::from(path), VARIANT::from(exclusive)];
            if !password.is_empty() {
                args.push(VARIANT::from(password));
            }
            invoke(&self.app, "OpenCurrentDatabase", DISPATCH_METHOD, &args)?;
            Ok(())
        }

        fn table_defs(&mut self) -> Result<Vec<TableDef>> {
            let db = self.current_db()?;
            let defs = invoke(&db, "TableDefs", DISPATCH_PROPERTYGET, &[])?;
            let defs = IDispatch::try_from(&defs).context("TableDefs is not a collection")?;
            let count = invoke(&defs, "Count", DISPATCH_PROPERTYGET, &[])?;
            let count = i32::try_from(&count).context("Count is not an integer")?;

            let mut result = Vec::with_capacity(count as usize);
            for i in 0..count {
                let item = invoke(&defs, "Item", DISPATCH_METHOD, &[VARIANT::from(i)])?;
                let item = IDispatch::try_from(&item).context("Item is not an object")?;
                let name = BSTR::try_from(&invoke(&item, "Name", DISPATCH_PROPERTYGET, &[])?)
                    .context("Name is not a string")?
                    .to_string();
                let connect = BSTR::try_from(&invoke(&item, "Connect", DISPATCH_PROPERTYGET, &[])?)
                    .ok()
                    .map(|b| b.to_string())
                    .filter(|c| !c.is_empty());
                result.push(TableDef { name, connect });
            }
            Ok(result)
        }

        fn update_table_connect(&mut self, table: &str, connect: &str) -> Result<()> {
            let item = self.table_def(table)?;
            invoke(&item, "Connect", DISPATCH_PROPERTYPUT, &[VARIANT::from(connect)])?;
            Ok(())
        }

        fn refresh_link(&mut self, table: &str) -> Result<()> {
            let item = self.table_def(table)?;
            invoke(&item, "RefreshLink", DISPATCH_METHOD, &[])?;
            Ok(())
        }

        fn close_database(&mut self) -> Result<()> {
            invoke(&self.app, "CloseCurrentDatabase", DISPATCH_METHOD, &[])?;
            Ok(())
        }

        fn quit(&mut self) -> Result<()> {
            invoke(&self.app, "Quit", DISPATCH_METHOD, &[])?;
            Ok(())
        }
    }

    impl Drop for AccessSession {
        fn drop(&mut self) {
            unsafe { CoUninitialize() };
        }
    }

    fn get_dispid(disp: &IDispatch, name: &str) -> Result<i32> {
        let wide = HSTRING::from(name);
        let mut dispid = 0i32;
        unsafe {
            disp.GetIDsOfNames(
                &GUID::zeroed(),
                &PCWSTR(wide.as_ptr()),
                1,
                GetUserDefaultLCID(),
                &mut dispid,
            )
        }
        .with_context(|| format!("Unknown automation member {name}"))?;
        Ok(dispid)
    }

    fn invoke(
        disp: &IDispatch,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> Result<VARIANT> {
        let dispid = get_dispid(disp, name)?;

        // IDispatch expects arguments in reverse order, and property puts
        // carry the put dispid as a named argument.
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut put_dispid = DISPID_PROPERTYPUT;
        let mut params = DISPPARAMS {
            rgvarg: reversed.as_mut_ptr(),
            cArgs: reversed.len() as u32,
            ..Default::default()
        };
        if flags == DISPATCH_PROPERTYPUT {
            params.rgdispidNamedArgs = &mut put_dispid;
            params.cNamedArgs = 1;
        }

        let mut result = VARIANT::default();
        unsafe {
            disp.Invoke(
                dispid,
                &GUID::zeroed(),
                GetUserDefaultLCID(),
                flags,
                &params,
                Some(&mut result),
                None,
                None,
            )
        }
        .with_context(|| format!("Automation call {name} failed"))?;
        Ok(result)
    }
}

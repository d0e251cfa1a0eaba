//! [`ControlSurface`] for an Oracle host, expressed as SQL and PL/SQL.
//!
//! Statement rendering is separated from execution through [`SqlExecutor`] so
//! the statements can be checked without a database. The executor for a real
//! `oracle::Connection` is compiled with the `oracle` cargo feature.

use super::surface::*;
use crate::configuration::types::ConnectionProfile;
use crate::error_handling::types::{ControlError, RemoteError};
use crate::resolver::ConnectDescriptor;
use log::{debug, trace};
use std::sync::Arc;

/// "success with compilation error": the unit was stored but is invalid.
const ORA_SUCCESS_WITH_COMPILATION_ERROR: i32 = 24344;

/// Bind value for a positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
}

/// Result rows with every column rendered as text.
pub type SqlRows = Vec<Vec<Option<String>>>;

pub trait SqlExecutor: Send {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), RemoteError>;
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlRows, RemoteError>;
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), RemoteError>;
    fn commit(&mut self) -> Result<(), RemoteError>;
    fn rollback(&mut self) -> Result<(), RemoteError>;
    fn close(&mut self) -> Result<(), RemoteError>;
    fn is_closed(&self) -> bool;
}

pub struct OracleSurface<E: SqlExecutor> {
    executor: E,
}

impl<E: SqlExecutor> OracleSurface<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    #[cfg(test)]
    pub(crate) fn executor(&self) -> &E {
        &self.executor
    }
}

/// Object names are inlined into DDL, so only plain identifiers are allowed.
fn checked_identifier(name: &str) -> Result<&str, RemoteError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(RemoteError::statement(format!(
            "refusing to inline object name {:?}",
            name
        )))
    }
}

/// PL/SQL block appending each bound chunk to a temporary CLOB and compiling
/// the result as a Java source unit. Each placeholder is used exactly once.
pub fn staged_upload_block(name: &str, chunk_count: usize) -> String {
    let mut block = String::from(
        "DECLARE\n  l_clob CLOB;\n  l_chunk VARCHAR2(32767);\nBEGIN\n  DBMS_LOB.CREATETEMPORARY(l_clob, TRUE);\n",
    );
    for i in 1..=chunk_count {
        block.push_str(&format!(
            "  l_chunk := :{};\n  DBMS_LOB.WRITEAPPEND(l_clob, LENGTH(l_chunk), l_chunk);\n",
            i
        ));
    }
    block.push_str(&format!(
        "  EXECUTE IMMEDIATE 'CREATE OR REPLACE AND COMPILE JAVA SOURCE NAMED \"{}\" AS ' || l_clob;\n  DBMS_LOB.FREETEMPORARY(l_clob);\nEND;",
        name
    ));
    block
}

fn parse_int(value: &Option<String>, column: &str) -> Result<i64, RemoteError> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| RemoteError::statement(format!("unexpected {} value {:?}", column, value)))
}

impl<E: SqlExecutor> ControlSurface for OracleSurface<E> {
    fn tag_session(&mut self, identifier: &str) -> Result<(), RemoteError> {
        self.executor.execute(
            "BEGIN DBMS_SESSION.SET_IDENTIFIER(:1); END;",
            &[SqlValue::Text(identifier.to_string())],
        )
    }

    fn has_privilege(&mut self, privilege: &str) -> Result<bool, RemoteError> {
        let rows = self.executor.query(
            "SELECT 1 FROM session_privs WHERE privilege = :1",
            &[SqlValue::Text(privilege.to_string())],
        )?;
        Ok(!rows.is_empty())
    }

    fn check_session_registry(&mut self) -> Result<(), RemoteError> {
        self.executor
            .query("SELECT 1 FROM v$session WHERE ROWNUM = 1", &[])
            .map(|_| ())
    }

    fn version_banner(&mut self) -> Result<Option<String>, RemoteError> {
        let rows = self.executor.query("SELECT banner FROM v$version", &[])?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().flatten()))
    }

    fn grant_permission(
        &mut self,
        principal: &str,
        permission: &Permission,
    ) -> Result<GrantOutcome, RemoteError> {
        let result = self.executor.execute(
            "BEGIN DBMS_JAVA.GRANT_PERMISSION(:1, :2, :3, :4); END;",
            &[
                SqlValue::Text(principal.to_string()),
                SqlValue::Text(permission.kind.to_string()),
                SqlValue::Text(permission.target.clone()),
                SqlValue::Text(permission.actions.to_string()),
            ],
        );
        match result {
            Ok(()) => Ok(GrantOutcome::Granted),
            Err(RemoteError::Statement { message, .. })
                if message.to_lowercase().contains("already") =>
            {
                debug!("Permission already held: {}", message);
                Ok(GrantOutcome::AlreadyHeld)
            }
            Err(e) => Err(e),
        }
    }

    fn upload_source(&mut self, name: &str, chunks: &[&str]) -> Result<(), RemoteError> {
        let name = checked_identifier(name)?;
        let block = staged_upload_block(name, chunks.len());
        let params: Vec<SqlValue> = chunks
            .iter()
            .map(|c| SqlValue::Text((*c).to_string()))
            .collect();
        trace!("Uploading {} in {} chunks", name, chunks.len());
        match self.executor.execute(&block, &params) {
            // Stored but invalid; the status check reports the diagnostics.
            Err(e) if e.code() == Some(ORA_SUCCESS_WITH_COMPILATION_ERROR) => Ok(()),
            other => other,
        }
    }

    fn compile_status(&mut self, name: &str) -> Result<Option<CompileStatus>, RemoteError> {
        let rows = self.executor.query(
            "SELECT status FROM user_objects WHERE object_name = :1",
            &[SqlValue::Text(name.to_string())],
        )?;
        if rows.is_empty() {
            return Ok(None);
        }
        let all_valid = rows.iter().all(|row| {
            row.first()
                .and_then(|v| v.as_deref())
                .map(|s| s.eq_ignore_ascii_case("VALID"))
                .unwrap_or(false)
        });
        Ok(Some(if all_valid {
            CompileStatus::Valid
        } else {
            CompileStatus::Invalid
        }))
    }

    fn compile_errors(&mut self, name: &str) -> Result<Vec<Diagnostic>, RemoteError> {
        let rows = self.executor.query(
            "SELECT line, position, text FROM user_errors WHERE name = :1 ORDER BY sequence",
            &[SqlValue::Text(name.to_string())],
        )?;
        rows.iter()
            .map(|row| {
                let cell = |i: usize| row.get(i).cloned().flatten();
                Ok(Diagnostic {
                    line: parse_int(&cell(0), "line")?,
                    column: parse_int(&cell(1), "position")?,
                    text: cell(2).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn register_entry_point(&mut self, entry: &EntryPoint) -> Result<(), RemoteError> {
        let procedure = checked_identifier(&entry.procedure)?;
        let sql = format!(
            "CREATE OR REPLACE PROCEDURE {}(port IN NUMBER)\nAS LANGUAGE JAVA\nNAME '{}';",
            procedure,
            entry.target.replace('\'', "''")
        );
        self.executor.execute(&sql, &[])
    }

    fn invoke_entry_point(&mut self, procedure: &str, port: u16) -> Result<(), RemoteError> {
        let procedure = checked_identifier(procedure)?;
        self.executor.execute(
            &format!("BEGIN {}(:1); END;", procedure),
            &[SqlValue::Int(i64::from(port))],
        )
    }

    fn sessions_by_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Vec<RemoteSession>, RemoteError> {
        let rows = self.executor.query(
            "SELECT sid, serial# FROM v$session WHERE client_identifier = :1",
            &[SqlValue::Text(identifier.to_string())],
        )?;
        rows.iter()
            .map(|row| {
                Ok(RemoteSession {
                    sid: parse_int(&row.first().cloned().flatten(), "sid")?,
                    serial: parse_int(&row.get(1).cloned().flatten(), "serial#")?,
                })
            })
            .collect()
    }

    fn force_terminate(&mut self, session: RemoteSession) -> Result<(), RemoteError> {
        // DDL takes no binds; both parts are integers.
        self.executor.execute(
            &format!(
                "ALTER SYSTEM KILL SESSION '{},{}' IMMEDIATE",
                session.sid, session.serial
            ),
            &[],
        )
    }

    fn session_alive(&mut self, session: RemoteSession) -> Result<bool, RemoteError> {
        let rows = self.executor.query(
            "SELECT 1 FROM v$session WHERE sid = :1 AND serial# = :2",
            &[SqlValue::Int(session.sid), SqlValue::Int(session.serial)],
        )?;
        Ok(!rows.is_empty())
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), RemoteError> {
        self.executor.set_autocommit(enabled)
    }

    fn commit(&mut self) -> Result<(), RemoteError> {
        self.executor.commit()
    }

    fn rollback(&mut self) -> Result<(), RemoteError> {
        self.executor.rollback()
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        self.executor.close()
    }

    fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }
}

/// Connector backed by the Oracle client libraries.
pub struct OracleConnector;

#[cfg(feature = "oracle")]
mod driver {
    use super::*;
    use oracle::sql_type::ToSql;
    use oracle::{ConnStatus, Connection, Privilege};

    /// invalid username/password, account locked, password expired
    const AUTH_CODES: [i32; 3] = [1017, 28000, 28001];

    fn remote(err: oracle::Error) -> RemoteError {
        match err.db_error() {
            Some(db) => RemoteError::Statement {
                code: Some(db.code()),
                message: db.message().to_string(),
            },
            None => RemoteError::statement(err.to_string()),
        }
    }

    fn binds(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
        params
            .iter()
            .map(|p| -> Box<dyn ToSql> {
                match p {
                    SqlValue::Text(s) => Box::new(s.clone()),
                    SqlValue::Int(i) => Box::new(*i),
                }
            })
            .collect()
    }

    pub struct OciExecutor {
        conn: Connection,
        closed: bool,
    }

    impl SqlExecutor for OciExecutor {
        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), RemoteError> {
            let owned = binds(params);
            let refs: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
            self.conn.execute(sql, &refs).map(|_| ()).map_err(remote)
        }

        fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlRows, RemoteError> {
            let owned = binds(params);
            let refs: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
            let result_set = self.conn.query(sql, &refs).map_err(remote)?;
            let columns = result_set.column_info().len();
            let mut rows = Vec::new();
            for row in result_set {
                let row = row.map_err(remote)?;
                let mut cells = Vec::with_capacity(columns);
                for i in 0..columns {
                    cells.push(row.get::<usize, Option<String>>(i).map_err(remote)?);
                }
                rows.push(cells);
            }
            Ok(rows)
        }

        fn set_autocommit(&mut self, enabled: bool) -> Result<(), RemoteError> {
            self.conn.set_autocommit(enabled);
            Ok(())
        }

        fn commit(&mut self) -> Result<(), RemoteError> {
            self.conn.commit().map_err(remote)
        }

        fn rollback(&mut self) -> Result<(), RemoteError> {
            self.conn.rollback().map_err(remote)
        }

        fn close(&mut self) -> Result<(), RemoteError> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.conn.close().map_err(remote)
        }

        fn is_closed(&self) -> bool {
            self.closed || !matches!(self.conn.status(), Ok(ConnStatus::Normal))
        }
    }

    impl Connector for OracleConnector {
        fn connect(
            &self,
            descriptor: &ConnectDescriptor,
            profile: &ConnectionProfile,
        ) -> Result<Box<dyn ControlSurface>, ControlError> {
            let mut connector = oracle::Connector::new(
                profile.username.as_str(),
                profile.password.as_str(),
                descriptor.connect_string(),
            );
            if profile.sysdba {
                connector.privilege(Privilege::Sysdba);
            }
            match connector.connect() {
                Ok(conn) => Ok(Box::new(OracleSurface::new(OciExecutor {
                    conn,
                    closed: false,
                }))),
                Err(err) => {
                    let remote = remote(err);
                    match remote.code() {
                        Some(code) if AUTH_CODES.contains(&code) => {
                            Err(ControlError::Auth(remote.to_string()))
                        }
                        _ => Err(ControlError::Network(remote.to_string())),
                    }
                }
            }
        }
    }
}

#[cfg(not(feature = "oracle"))]
impl Connector for OracleConnector {
    fn connect(
        &self,
        descriptor: &ConnectDescriptor,
        _profile: &ConnectionProfile,
    ) -> Result<Box<dyn ControlSurface>, ControlError> {
        Err(ControlError::Network(format!(
            "cannot reach {}: built without the `oracle` feature",
            descriptor
        )))
    }
}

pub fn default_connector() -> Arc<dyn Connector> {
    Arc::new(OracleConnector)
}

//! Connection opening.
//!
//! Connections are cheap to open and are never shared: every analytical
//! operation opens its own handle and drops it when done.

use crate::error::{Result, StoreError};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 250;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Query-only access to an existing database file.
    ReadOnly,
    /// Read/write access; creates the file if missing.
    ReadWrite,
}

pub struct StoreConn {
    conn: Connection,
}

impl StoreConn {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let flags = match mode {
            OpenMode::ReadOnly => {
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            OpenMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
        };
        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(open_err)?;
        match mode {
            OpenMode::ReadOnly => conn.pragma_update(None, "query_only", 1).map_err(open_err)?,
            OpenMode::ReadWrite => conn
                .pragma_update(None, "foreign_keys", 1)
                .map_err(open_err)?,
        }
        Ok(Self { conn })
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::open(path, OpenMode::ReadOnly)
    }

    pub fn open_read_write(path: &Path) -> Result<Self> {
        Self::open(path, OpenMode::ReadWrite)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

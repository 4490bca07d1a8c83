//! SQLite connection pool shared by the world storage and the tile store.
//!
//! One writer connection behind a mutex plus a fixed set of reader
//! connections handed out round-robin. In WAL mode readers never block the
//! writer, so parallel render workers can read while tiles are being written.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Journal settings applied to every connection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JournalOptions {
    /// Let SQLite checkpoint the WAL on its own. Disabled for the tile store,
    /// which checkpoints once per export.
    pub auto_checkpoint: bool,
}

pub(crate) struct SqlitePool {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl SqlitePool {
    /// Opens (creating if needed) the database and runs `init` on the writer
    /// before any reader connects.
    pub fn open<F>(
        path: &Path,
        reader_count: usize,
        options: JournalOptions,
        init: F,
    ) -> rusqlite::Result<Self>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<()>,
    {
        let writer = Connection::open(path)?;
        configure(&writer, options)?;
        init(&writer)?;

        let readers = (0..reader_count.max(1))
            .map(|_| {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(Mutex::new(conn))
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs a read-only closure on the next reader connection.
    pub fn read<T, F>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx].lock();
        f(&conn)
    }

    /// Runs a closure on the writer connection.
    pub fn write<T, F>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self.writer.lock();
        f(&mut conn)
    }

    /// Size of the main database file plus its write-ahead log.
    pub fn size_bytes(&self) -> rusqlite::Result<u64> {
        let (pages, page_size) = self.read(|conn| {
            let pages: i64 = conn.pragma_query_value(None, "page_count", |r| r.get(0))?;
            let page_size: i64 = conn.pragma_query_value(None, "page_size", |r| r.get(0))?;
            Ok((pages, page_size))
        })?;
        let mut wal = self.path.clone().into_os_string();
        wal.push("-wal");
        let wal_size = std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        Ok((pages.max(0) as u64) * (page_size.max(0) as u64) + wal_size)
    }
}

fn configure(conn: &Connection, options: JournalOptions) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "Database did not switch to WAL mode");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    if !options.auto_checkpoint {
        let _: i64 = conn.pragma_update_and_check(None, "wal_autocheckpoint", 0, |row| row.get(0))?;
    }
    Ok(())
}

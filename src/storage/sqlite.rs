//! SQLite storage implementation

use std::path::{Path, PathBuf};
use rusqlite::{Connection, OpenFlags};
use crate::Result;
use crate::codec;
use crate::config::StoreConfig;
use super::schema;

/// SQLite-backed card store
#[derive(Debug)]
pub struct CardStore {
    pub(super) conn: Connection,
    path: Option<PathBuf>,
}

impl CardStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Open a database file with explicit connection options
    pub fn open_with_config(path: &Path, config: &StoreConfig) -> Result<Self> {
        // fail before touching the file if the process-wide registry is unusable
        codec::registry()?;

        let path = std::path::absolute(path)?;
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::info!("Opening card store {}", path.display());

        let store = Self { conn, path: Some(path) };
        store.initialize(config)?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.initialize(&StoreConfig::default())?;
        Ok(store)
    }

    /// Apply connection options, attach the codec functions and migrate.
    ///
    /// rusqlite turns on extended result codes for every connection it
    /// opens, so engine errors always carry the extended code.
    fn initialize(&self, config: &StoreConfig) -> Result<()> {
        self.conn.busy_timeout(config.busy_timeout())?;
        // only takes effect before the first table is created
        self.conn.execute_batch("PRAGMA encoding = 'UTF-16';")?;
        self.conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        codec::register_functions(&self.conn)?;
        schema::migrate(&self.conn)?;
        Ok(())
    }

    /// The underlying connection, for direct reads and writes
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file; `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<i64> {
        schema::schema_version(&self.conn)
    }

    // ========== Maintenance Operations ==========

    /// Allocated size of the database in bytes (page size * page count)
    pub fn size(&self) -> Result<i64> {
        let page_size: i64 = self.conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
        let page_count: i64 = self.conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        Ok(page_size * page_count)
    }

    /// Rebuild the database to reclaim free pages
    pub fn vacuum(&self) -> Result<VacuumStats> {
        let old_size = self.size()?;
        self.conn.execute_batch("VACUUM;")?;
        let new_size = self.size()?;

        tracing::info!("Vacuumed card store: {} -> {} bytes", old_size, new_size);
        Ok(VacuumStats { new_size, old_size })
    }

    /// Count rows in one of the schema tables
    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            cards: self.count_rows("card")?,
            details: self.count_rows("carddetail")?,
            faqs: self.count_rows("cardfaq")?,
            related: self.count_rows("cardfaqrelated")?,
            images: self.count_rows("cardimage")?,
            size: self.size()?,
        })
    }
}

/// Sizes reported by [`CardStore::vacuum`], in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacuumStats {
    pub new_size: i64,
    pub old_size: i64,
}

impl VacuumStats {
    pub fn reclaimed(&self) -> i64 {
        self.old_size - self.new_size
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub cards: usize,
    pub details: usize,
    pub faqs: usize,
    pub related: usize,
    pub images: usize,
    pub size: i64,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Cards: {}", self.cards)?;
        writeln!(f, "  Details: {}", self.details)?;
        writeln!(f, "  FAQs: {}", self.faqs)?;
        writeln!(f, "  Related: {}", self.related)?;
        writeln!(f, "  Images: {}", self.images)?;
        writeln!(f, "  Size: {} bytes", self.size)
    }
}

//! Import Engine - build a new store from an exported file tree
//!
//! Every file under `<source>/card` is one card document. The document text
//! is bound as-is to five insert statements which take it apart with
//! `json_extract`/`json_each`. All files are loaded inside one IMMEDIATE
//! transaction; on any failure the half-built store file is deleted.

use std::path::{Path, PathBuf};
use rusqlite::{Statement, Transaction, TransactionBehavior};
use crate::card::CardDocument;
use crate::config::{StoreConfig, ensure_db_dir};
use crate::{Error, Result};
use super::export::CARD_DIRECTORY;
use super::sqlite::CardStore;

const INSERT_CARD_SQL: &str = r#"
WITH input(value) AS (SELECT ?1)
INSERT INTO card (cardid, type, color, rarity)
SELECT json_extract(input.value, '$.cardid'),
       json_extract(input.value, '$.type'),
       json_extract(input.value, '$.color'),
       json_extract(input.value, '$.rarity')
FROM input
"#;

/// Leader cards never carry a cost; any other card defaults to 0
const INSERT_CARDDETAIL_SQL: &str = r#"
WITH input(value) AS (SELECT ?1)
INSERT INTO carddetail (cardid, side, language, name, cost, specifiedcost, power, combopower, traits, effect)
SELECT json_extract(input.value, '$.cardid'),
       json_extract(detail.value, '$.side'),
       json_extract(detail.value, '$.language'),
       json_extract(detail.value, '$.name'),
       CASE WHEN cardtype(json_extract(input.value, '$.type')) = 1 THEN NULL
            ELSE coalesce(json_extract(detail.value, '$.cost'), 0) END,
       json_extract(detail.value, '$.specifiedcost'),
       json_extract(detail.value, '$.power'),
       json_extract(detail.value, '$.combopower'),
       json_extract(detail.value, '$.traits'),
       json_extract(detail.value, '$.effect')
FROM input, json_each(input.value, '$.detail') AS detail
WHERE json_extract(input.value, '$.detail') IS NOT NULL
"#;

const INSERT_CARDFAQ_SQL: &str = r#"
WITH input(value) AS (SELECT ?1)
INSERT INTO cardfaq (cardid, faqid, language, question, answer)
SELECT json_extract(input.value, '$.cardid'),
       json_extract(faq.value, '$.faqid'),
       json_extract(faq.value, '$.language'),
       json_extract(faq.value, '$.question'),
       json_extract(faq.value, '$.answer')
FROM input, json_each(input.value, '$.faq') AS faq
WHERE json_extract(input.value, '$.faq') IS NOT NULL
"#;

const INSERT_CARDFAQRELATED_SQL: &str = r#"
WITH input(value) AS (SELECT ?1)
INSERT INTO cardfaqrelated (cardid, faqid, language, relatedcardid)
SELECT json_extract(input.value, '$.cardid'),
       json_extract(faq.value, '$.faqid'),
       json_extract(faq.value, '$.language'),
       related.value
FROM input, json_each(input.value, '$.faq') AS faq, json_each(faq.value, '$.related') AS related
WHERE json_extract(input.value, '$.faq') IS NOT NULL
  AND json_extract(faq.value, '$.related') IS NOT NULL
"#;

/// A null image is stored as a zero-length payload, which exports as null again
const INSERT_CARDIMAGE_SQL: &str = r#"
WITH input(value) AS (SELECT ?1)
INSERT INTO cardimage (cardid, side, language, format, image)
SELECT json_extract(input.value, '$.cardid'),
       json_extract(image.value, '$.side'),
       json_extract(image.value, '$.language'),
       json_extract(image.value, '$.format'),
       coalesce(base64decode(json_extract(image.value, '$.image')), zeroblob(0))
FROM input, json_each(input.value, '$.image') AS image
WHERE json_extract(input.value, '$.image') IS NOT NULL
"#;

/// The five insert statements, prepared once per import
struct CardInserts<'conn> {
    card: Statement<'conn>,
    detail: Statement<'conn>,
    faq: Statement<'conn>,
    related: Statement<'conn>,
    image: Statement<'conn>,
}

impl<'conn> CardInserts<'conn> {
    fn prepare(tx: &'conn Transaction<'_>) -> Result<Self> {
        Ok(Self {
            card: tx.prepare(INSERT_CARD_SQL)?,
            detail: tx.prepare(INSERT_CARDDETAIL_SQL)?,
            faq: tx.prepare(INSERT_CARDFAQ_SQL)?,
            related: tx.prepare(INSERT_CARDFAQRELATED_SQL)?,
            image: tx.prepare(INSERT_CARDIMAGE_SQL)?,
        })
    }

    /// Insert one document; each statement is reset after it runs so the
    /// next file can rebind it
    fn insert(&mut self, json: &str) -> Result<()> {
        self.card.execute([json])?;
        self.detail.execute([json])?;
        self.faq.execute([json])?;
        self.related.execute([json])?;
        self.image.execute([json])?;
        Ok(())
    }
}

/// Regular files of an import directory, sorted by name
fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Read, parse and validate every document, inserting each in turn
fn load_documents(tx: &Transaction<'_>, files: &[PathBuf]) -> Result<usize> {
    let mut inserts = CardInserts::prepare(tx)?;

    for file in files {
        let json = std::fs::read_to_string(file)?;
        let document: CardDocument = serde_json::from_str(&json)?;
        document.validate()?;

        tracing::debug!("Importing {} from {}", document.cardid, file.display());
        inserts.insert(&json)?;
    }
    Ok(files.len())
}

/// Store file plus the WAL and shared-memory files SQLite keeps beside it
fn store_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

fn remove_store_files(path: &Path) -> std::io::Result<()> {
    for file in store_files(path) {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl CardStore {
    /// Create a new store at `destination` from the file tree at `source`
    pub fn import(source: &Path, destination: &Path) -> Result<CardStore> {
        Self::import_with_config(source, destination, &StoreConfig::default())
    }

    /// Create a new store at `destination` from the file tree at `source`.
    ///
    /// Any existing store at `destination` is replaced. The import is all
    /// or nothing: on failure no store file is left behind.
    pub fn import_with_config(source: &Path, destination: &Path, config: &StoreConfig) -> Result<CardStore> {
        let source = std::path::absolute(source)?;
        let destination = std::path::absolute(destination)?;

        let card_dir = source.join(CARD_DIRECTORY);
        if !card_dir.is_dir() {
            return Err(Error::path(card_dir, "import directory is not accessible"));
        }
        let files = list_documents(&card_dir)?;

        ensure_db_dir(&destination)
            .map_err(|e| Error::path(&destination, format!("unable to create output directory: {}", e)))?;
        remove_store_files(&destination)?;

        match Self::build(&destination, &files, config) {
            Ok(store) => Ok(store),
            Err(err) => {
                Self::discard(&destination);
                Err(err)
            }
        }
    }

    /// Open the new store and load every document in one transaction.
    /// The connection is closed by the time this returns an error.
    fn build(destination: &Path, files: &[PathBuf], config: &StoreConfig) -> Result<CardStore> {
        let mut store = CardStore::open_with_config(destination, config)?;

        let tx = store.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match load_documents(&tx, files) {
            Ok(count) => {
                tx.commit()?;
                tracing::info!("Imported {} cards into {}", count, destination.display());
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!("Rollback of failed import failed: {}", rollback);
                }
                return Err(err);
            }
        }

        if config.vacuum_after_import {
            store.vacuum()?;
        }
        Ok(store)
    }

    /// Delete a half-built store
    fn discard(destination: &Path) {
        if let Err(e) = remove_store_files(destination) {
            tracing::warn!("Unable to delete incomplete store {}: {}", destination.display(), e);
        }
    }
}

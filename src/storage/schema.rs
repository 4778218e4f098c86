//! Database schema definitions and migrations
//!
//! The schema version lives in `PRAGMA user_version`. A new database is at
//! version 0; each migration moves it forward by one.

use crate::{Error, Result};
use rusqlite::Connection;

/// Version this build reads and writes
pub const CURRENT_VERSION: i64 = 1;

/// SQL to create the card table
pub const CREATE_CARD_TABLE: &str = r#"
CREATE TABLE card (
    cardid TEXT NOT NULL,
    type TEXT NOT NULL,
    color TEXT NOT NULL,
    rarity TEXT NOT NULL,
    PRIMARY KEY (cardid),
    CHECK (type IN ('LEADER', 'BATTLE', 'EXTRA')),
    CHECK (color IN ('Red', 'Blue', 'Green', 'Yellow', 'Black')),
    CHECK (rarity IN ('L', 'C', 'R', 'SR', 'SCR', 'PR'))
)
"#;

/// SQL to create the carddetail table
pub const CREATE_CARDDETAIL_TABLE: &str = r#"
CREATE TABLE carddetail (
    cardid TEXT NOT NULL,
    side TEXT NULL,
    language TEXT NOT NULL,
    name TEXT NOT NULL,
    cost INTEGER NULL,
    specifiedcost TEXT NULL,
    power INTEGER NULL,
    combopower INTEGER NULL,
    traits TEXT NULL,
    effect TEXT NULL,
    PRIMARY KEY (cardid, side, language),
    FOREIGN KEY (cardid) REFERENCES card (cardid),
    CHECK (side IN ('FRONT', 'BACK')),
    CHECK (language IN ('EN', 'JP'))
)
"#;

/// SQL to create the cardfaq table
pub const CREATE_CARDFAQ_TABLE: &str = r#"
CREATE TABLE cardfaq (
    cardid TEXT NOT NULL,
    faqid TEXT NOT NULL,
    language TEXT NOT NULL,
    question TEXT NOT NULL,
    answer TEXT NULL,
    PRIMARY KEY (cardid, faqid, language),
    FOREIGN KEY (cardid) REFERENCES card (cardid),
    CHECK (language IN ('EN', 'JP'))
)
"#;

/// SQL to create the cardfaqrelated table
/// The related card is not a foreign key; it may name a card that is not stored
pub const CREATE_CARDFAQRELATED_TABLE: &str = r#"
CREATE TABLE cardfaqrelated (
    cardid TEXT NOT NULL,
    faqid TEXT NOT NULL,
    language TEXT NOT NULL,
    relatedcardid TEXT NOT NULL,
    PRIMARY KEY (cardid, faqid, language, relatedcardid),
    FOREIGN KEY (cardid, faqid, language) REFERENCES cardfaq (cardid, faqid, language),
    CHECK (language IN ('EN', 'JP'))
)
"#;

/// SQL to create the cardimage table
pub const CREATE_CARDIMAGE_TABLE: &str = r#"
CREATE TABLE cardimage (
    cardid TEXT NOT NULL,
    side TEXT NULL,
    language TEXT NOT NULL,
    format TEXT NOT NULL,
    image BLOB NOT NULL,
    PRIMARY KEY (cardid, side, language),
    FOREIGN KEY (cardid) REFERENCES card (cardid),
    CHECK (side IN ('FRONT', 'BACK')),
    CHECK (language IN ('EN', 'JP'))
)
"#;

/// Table names, in dependency order
pub const TABLES: &[&str] = &["card", "carddetail", "cardfaq", "cardfaqrelated", "cardimage"];

/// A forward step between two consecutive schema versions
pub struct Migration {
    pub from: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// All migrations, ordered by `from`
pub const MIGRATIONS: &[Migration] = &[Migration {
    from: 0,
    name: "create card tables",
    statements: &[
        CREATE_CARD_TABLE,
        CREATE_CARDDETAIL_TABLE,
        CREATE_CARDFAQ_TABLE,
        CREATE_CARDFAQRELATED_TABLE,
        CREATE_CARDIMAGE_TABLE,
    ],
}];

pub fn schema_version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to `CURRENT_VERSION`.
///
/// Each migration runs in its own transaction together with the version
/// bump. Any version that is neither migratable nor current is an error.
pub fn migrate(conn: &Connection) -> Result<i64> {
    let mut version = schema_version(conn)?;

    while let Some(migration) = MIGRATIONS.iter().find(|m| m.from == version) {
        tracing::debug!("Migrating schema {} -> {}: {}", version, version + 1, migration.name);

        let tx = conn.unchecked_transaction()?;
        for stmt in migration.statements {
            tx.execute(stmt, [])?;
        }
        tx.pragma_update(None, "user_version", version + 1)?;
        tx.commit()?;

        version += 1;
    }

    if version != CURRENT_VERSION {
        return Err(Error::SchemaVersion { found: version, expected: CURRENT_VERSION });
    }
    Ok(version)
}

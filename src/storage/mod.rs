//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - card(cardid, type, color, rarity)
//! - carddetail(cardid, side, language, name, cost, specifiedcost, power, combopower, traits, effect)
//! - cardfaq(cardid, faqid, language, question, answer)
//! - cardfaqrelated(cardid, faqid, language, relatedcardid)
//! - cardimage(cardid, side, language, format, image)
//!
//! Export and import move a whole store to and from a `card/` directory of
//! JSON documents.

pub mod export;
pub mod import;
pub mod schema;
pub mod sqlite;

pub use export::CARD_DIRECTORY;
pub use sqlite::{CardStore, DbStats, VacuumStats};

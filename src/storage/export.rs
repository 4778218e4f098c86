//! Export Engine - one pretty-printed JSON document per card
//!
//! Documents are assembled inside SQLite with `json_object` and
//! `json_group_array`; rows are streamed one card at a time and written to
//! `<destination>/card/<CARDID>.json`.

use std::path::Path;
use crate::card::{CardDocument, file_name_for};
use crate::{Error, Result};
use super::sqlite::CardStore;

/// Name of the card entity directory inside an export root
pub const CARD_DIRECTORY: &str = "card";

/// One row per card: (cardid, pretty-printed document).
///
/// Nested arrays are built from ordered CTEs and re-wrapped with `json()`
/// so they embed as JSON rather than as strings.
const EXPORT_CARDS_SQL: &str = r#"
SELECT card.cardid, prettyjson(json_object(
    'cardid', card.cardid,
    'type', card.type,
    'color', card.color,
    'rarity', card.rarity,
    'detail', json((
        WITH details(doc) AS (
            SELECT json_object(
                'side', detail.side,
                'language', detail.language,
                'name', detail.name,
                'cost', detail.cost,
                'specifiedcost', detail.specifiedcost,
                'power', detail.power,
                'combopower', detail.combopower,
                'traits', detail.traits,
                'effect', detail.effect)
            FROM carddetail AS detail
            WHERE detail.cardid = card.cardid
            ORDER BY detail.language ASC, detail.side DESC
        )
        SELECT json_group_array(json(details.doc)) FROM details
    )),
    'faq', json((
        WITH faqs(doc) AS (
            SELECT json_object(
                'faqid', faq.faqid,
                'language', faq.language,
                'question', faq.question,
                'answer', faq.answer,
                'related', json((
                    WITH related(relatedcardid) AS (
                        SELECT rel.relatedcardid
                        FROM cardfaqrelated AS rel
                        WHERE rel.cardid = faq.cardid AND rel.faqid = faq.faqid AND rel.language = faq.language
                        ORDER BY rel.relatedcardid ASC
                    )
                    SELECT CASE WHEN count(*) = 0 THEN NULL ELSE json_group_array(related.relatedcardid) END
                    FROM related
                )))
            FROM cardfaq AS faq
            WHERE faq.cardid = card.cardid
            ORDER BY faq.language ASC, faq.faqid ASC
        )
        SELECT CASE WHEN count(*) = 0 THEN NULL ELSE json_group_array(json(faqs.doc)) END FROM faqs
    )),
    'image', json((
        WITH images(doc) AS (
            SELECT json_object(
                'side', image.side,
                'language', image.language,
                'format', image.format,
                'image', base64encode(image.image))
            FROM cardimage AS image
            WHERE image.cardid = card.cardid
            ORDER BY image.language ASC, image.side DESC
        )
        SELECT json_group_array(json(images.doc)) FROM images
    ))
))
FROM card
ORDER BY card.cardid
"#;

/// Create `path` if it does not exist yet
pub(super) fn ensure_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::path(path, format!("unable to create directory: {}", e)))?;
    }
    Ok(())
}

impl CardStore {
    /// Export every card into `destination/card/`, one file per card.
    ///
    /// Returns the number of documents written.
    pub fn export(&self, destination: &Path) -> Result<usize> {
        let destination = std::path::absolute(destination)?;
        ensure_directory(&destination)?;
        let card_dir = destination.join(CARD_DIRECTORY);
        ensure_directory(&card_dir)?;

        let mut stmt = self.conn.prepare(EXPORT_CARDS_SQL)?;
        let mut rows = stmt.query([])?;
        let mut written = 0;

        while let Some(row) = rows.next()? {
            let cardid: Option<String> = row.get(0)?;
            let Some(cardid) = cardid else { continue };
            let json: String = row.get(1)?;

            // reject documents that import would refuse
            let document: CardDocument = serde_json::from_str(&json)
                .map_err(|e| Error::inconsistent(&cardid, format!("unreadable document: {}", e)))?;
            document.validate()?;

            let file = card_dir.join(file_name_for(&cardid));
            tracing::debug!("Exporting {} to {}", cardid, file.display());
            std::fs::write(&file, json)?;
            written += 1;
        }

        tracing::info!("Exported {} cards to {}", written, card_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn leader_store() -> CardStore {
        let store = CardStore::open_in_memory().unwrap();
        let conn = store.connection();
        conn.execute("INSERT INTO card VALUES ('FB01-001', 'LEADER', 'Red', 'L')", []).unwrap();
        for (side, language, power) in [("BACK", "EN", 20000), ("FRONT", "JP", 15000), ("FRONT", "EN", 15000), ("BACK", "JP", 20000)] {
            conn.execute(
                "INSERT INTO carddetail (cardid, side, language, name, power, traits) VALUES ('FB01-001', ?1, ?2, 'Son Goku', ?3, 'Saiyan')",
                params![side, language, power],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO cardimage VALUES ('FB01-001', ?1, ?2, 'webp', ?3)",
                params![side, language, format!("{}-{}", side, language).into_bytes()],
            )
            .unwrap();
        }
        store
    }

    fn read_document(root: &Path, cardid: &str) -> serde_json::Value {
        let text = std::fs::read_to_string(root.join("card").join(format!("{}.json", cardid))).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_export_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out").join("nested");
        let store = CardStore::open_in_memory().unwrap();

        assert_eq!(store.export(&root).unwrap(), 0);
        assert!(root.join("card").is_dir());
    }

    #[test]
    fn test_export_orders_sides_and_languages() {
        let dir = tempfile::tempdir().unwrap();
        let store = leader_store();
        assert_eq!(store.export(dir.path()).unwrap(), 1);

        let doc = read_document(dir.path(), "FB01-001");
        let order: Vec<(String, String)> = doc["detail"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| (d["language"].as_str().unwrap().to_string(), d["side"].as_str().unwrap().to_string()))
            .collect();
        let expected = [("EN", "FRONT"), ("EN", "BACK"), ("JP", "FRONT"), ("JP", "BACK")];
        assert_eq!(order, expected.map(|(l, s)| (l.to_string(), s.to_string())));

        let images: Vec<&str> = doc["image"].as_array().unwrap().iter().map(|i| i["image"].as_str().unwrap()).collect();
        assert_eq!(images[0], crate::codec::base64_encode(b"FRONT-EN").unwrap());
        assert_eq!(images[3], crate::codec::base64_encode(b"BACK-JP").unwrap());
    }

    #[test]
    fn test_export_null_policy_and_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = leader_store();
        store.export(dir.path()).unwrap();

        let text = std::fs::read_to_string(dir.path().join("card").join("FB01-001.json")).unwrap();
        assert!(text.starts_with("{\n  \"cardid\": \"FB01-001\",\n  \"type\": \"LEADER\",\n  \"color\": \"Red\",\n  \"rarity\": \"L\",\n  \"detail\": ["));
        assert!(text.contains("\n  \"faq\": null,\n  \"image\": ["));
        assert!(text.contains("\"cost\": null"));
        assert!(text.contains("\"combopower\": null"));
        assert!(!text.contains('\r'));

        let doc = read_document(dir.path(), "FB01-001");
        let keys: Vec<&String> = doc["detail"][0].as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            ["side", "language", "name", "cost", "specifiedcost", "power", "combopower", "traits", "effect"]
        );
    }

    #[test]
    fn test_export_faqs_and_related() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::open_in_memory().unwrap();
        let conn = store.connection();
        conn.execute("INSERT INTO card VALUES ('fb01-050', 'EXTRA', 'Green', 'R')", []).unwrap();
        conn.execute("INSERT INTO carddetail (cardid, side, language, name, cost) VALUES ('fb01-050', NULL, 'EN', 'Kamehameha', 2)", []).unwrap();
        conn.execute("INSERT INTO cardimage VALUES ('fb01-050', NULL, 'EN', 'webp', x'00')", []).unwrap();
        conn.execute("INSERT INTO cardfaq VALUES ('fb01-050', '2', 'EN', 'Second?', NULL)", []).unwrap();
        conn.execute("INSERT INTO cardfaq VALUES ('fb01-050', '1', 'JP', 'Japanese?', 'Yes')", []).unwrap();
        conn.execute("INSERT INTO cardfaq VALUES ('fb01-050', '1', 'EN', 'First?', 'Yes')", []).unwrap();
        for related in ["FB02-003", "FB01-001"] {
            conn.execute("INSERT INTO cardfaqrelated VALUES ('fb01-050', '1', 'EN', ?1)", [related]).unwrap();
        }

        store.export(dir.path()).unwrap();
        let doc = read_document(dir.path(), "FB01-050");

        let faqs = doc["faq"].as_array().unwrap();
        let order: Vec<(&str, &str)> = faqs
            .iter()
            .map(|f| (f["language"].as_str().unwrap(), f["faqid"].as_str().unwrap()))
            .collect();
        assert_eq!(order, [("EN", "1"), ("EN", "2"), ("JP", "1")]);
        assert_eq!(faqs[0]["related"], serde_json::json!(["FB01-001", "FB02-003"]));
        assert!(faqs[1]["related"].is_null());
        assert!(faqs[1]["answer"].is_null());
        assert!(doc["detail"][0]["side"].is_null());
    }

    #[test]
    fn test_export_rejects_leader_without_back_side() {
        let dir = tempfile::tempdir().unwrap();
        let store = leader_store();
        store
            .connection()
            .execute("DELETE FROM cardimage WHERE side = 'BACK' AND language = 'JP'", [])
            .unwrap();

        let err = store.export(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Inconsistent { ref cardid, .. } if cardid == "FB01-001"));
    }

    #[test]
    fn test_export_rejects_cardid_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = CardStore::open_in_memory().unwrap();
        let conn = store.connection();
        conn.execute("INSERT INTO card VALUES ('../../escaped', 'BATTLE', 'Red', 'C')", []).unwrap();
        conn.execute("INSERT INTO carddetail (cardid, side, language, name, cost) VALUES ('../../escaped', NULL, 'EN', 'x', 1)", []).unwrap();
        conn.execute("INSERT INTO cardimage VALUES ('../../escaped', NULL, 'EN', 'webp', x'00')", []).unwrap();

        let err = store.export(&root).unwrap_err();
        assert!(matches!(err, Error::Inconsistent { .. }), "{}", err);
        assert!(!dir.path().join("a").join("ESCAPED.json").exists());
        assert_eq!(std::fs::read_dir(root.join("card")).unwrap().count(), 0);
    }

    #[test]
    fn test_export_rejects_card_without_details() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::open_in_memory().unwrap();
        store
            .connection()
            .execute("INSERT INTO card VALUES ('FB01-070', 'EXTRA', 'Green', 'R')", [])
            .unwrap();

        assert!(matches!(store.export(dir.path()), Err(Error::Inconsistent { .. })));
    }

    #[test]
    fn test_export_empty_image_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::open_in_memory().unwrap();
        let conn = store.connection();
        conn.execute("INSERT INTO card VALUES ('FB01-060', 'BATTLE', 'Black', 'C')", []).unwrap();
        conn.execute("INSERT INTO carddetail (cardid, side, language, name, cost) VALUES ('FB01-060', NULL, 'JP', 'x', 1)", []).unwrap();
        conn.execute("INSERT INTO cardimage VALUES ('FB01-060', NULL, 'JP', 'webp', zeroblob(0))", []).unwrap();

        store.export(dir.path()).unwrap();
        let doc = read_document(dir.path(), "FB01-060");
        assert!(doc["image"][0]["image"].is_null());
    }
}

//! Card model - the typed form of an exported card document
//!
//! One `CardDocument` corresponds to one row of `card` plus its detail,
//! FAQ and image rows. Field names match the JSON keys of the export
//! format, and field order matches the key order written by export.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path};

/// Card type as stored in `card.type`.
///
/// `None` is never stored; it is the classification of any string that
/// is not an exact, case-sensitive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardType {
    #[serde(skip)]
    None = 0,
    Leader = 1,
    Battle = 2,
    Extra = 3,
}

impl CardType {
    /// Classify a stored type string; anything unrecognised is `None`
    pub fn from_name(name: &str) -> Self {
        match name {
            "LEADER" => CardType::Leader,
            "BATTLE" => CardType::Battle,
            "EXTRA" => CardType::Extra,
            _ => CardType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::None => "",
            CardType::Leader => "LEADER",
            CardType::Battle => "BATTLE",
            CardType::Extra => "EXTRA",
        }
    }

    /// Integer code returned by the `cardtype()` SQL function
    pub fn code(&self) -> i64 {
        *self as i64
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Card color, stored by full name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Black,
}

/// Card rarity, stored by its printed code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    #[serde(rename = "L")]
    Leader,
    #[serde(rename = "C")]
    Common,
    #[serde(rename = "R")]
    Rare,
    #[serde(rename = "SR")]
    SuperRare,
    #[serde(rename = "SCR")]
    SecretRare,
    #[serde(rename = "PR")]
    Promo,
}

/// Face of a two-sided (Leader) card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "FRONT",
            Side::Back => "BACK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    Jp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Jp => "JP",
        }
    }
}

/// A card and everything attached to it, as written to `card/<CARDID>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDocument {
    pub cardid: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub color: Color,
    pub rarity: Rarity,
    pub detail: Vec<DetailEntry>,
    pub faq: Option<Vec<FaqEntry>>,
    pub image: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailEntry {
    pub side: Option<Side>,
    pub language: Language,
    pub name: String,
    pub cost: Option<i64>,
    pub specifiedcost: Option<String>,
    pub power: Option<i64>,
    pub combopower: Option<i64>,
    pub traits: Option<String>,
    pub effect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub faqid: String,
    pub language: Language,
    pub question: String,
    pub answer: Option<String>,
    pub related: Option<Vec<String>>,
}

/// Image of one card face; `image` holds the base64 payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub side: Option<Side>,
    pub language: Language,
    pub format: String,
    pub image: Option<String>,
}

impl CardDocument {
    /// Check the per-language side cardinality rules and Leader power.
    ///
    /// Leader cards need exactly one FRONT and one BACK detail and image
    /// for every language they carry; all other cards need exactly one
    /// sideless entry of each per language. The card id must be usable as
    /// a single file name.
    pub fn validate(&self) -> Result<()> {
        check_cardid(&self.cardid)?;
        if self.detail.is_empty() {
            return Err(Error::inconsistent(&self.cardid, "card has no detail entries"));
        }
        if self.image.is_empty() {
            return Err(Error::inconsistent(&self.cardid, "card has no image entries"));
        }

        let languages: BTreeSet<Language> = self
            .detail
            .iter()
            .map(|d| d.language)
            .chain(self.image.iter().map(|i| i.language))
            .collect();

        for language in languages {
            let detail_sides: Vec<Option<Side>> = self
                .detail
                .iter()
                .filter(|d| d.language == language)
                .map(|d| d.side)
                .collect();
            let image_sides: Vec<Option<Side>> = self
                .image
                .iter()
                .filter(|i| i.language == language)
                .map(|i| i.side)
                .collect();

            self.check_sides("detail", language, &detail_sides)?;
            self.check_sides("image", language, &image_sides)?;
        }

        if self.card_type == CardType::Leader {
            if let Some(detail) = self.detail.iter().find(|d| d.power.is_none()) {
                return Err(Error::inconsistent(
                    &self.cardid,
                    format!("leader detail ({}) has no power", detail.language.as_str()),
                ));
            }
        }

        Ok(())
    }

    fn check_sides(&self, what: &str, language: Language, sides: &[Option<Side>]) -> Result<()> {
        if self.card_type == CardType::Leader {
            for side in [Side::Front, Side::Back] {
                let count = sides.iter().filter(|s| **s == Some(side)).count();
                if count != 1 {
                    return Err(Error::inconsistent(
                        &self.cardid,
                        format!(
                            "leader card has {} {} {} entries for language {} (expected 1)",
                            count,
                            side.as_str(),
                            what,
                            language.as_str()
                        ),
                    ));
                }
            }
            if sides.len() != 2 {
                return Err(Error::inconsistent(
                    &self.cardid,
                    format!("leader card has {} {} entries for language {} (expected 2)", sides.len(), what, language.as_str()),
                ));
            }
        } else if let Some(side) = sides.iter().flatten().next() {
            return Err(Error::inconsistent(
                &self.cardid,
                format!("{} card has a {} {} entry for language {}", self.card_type, side.as_str(), what, language.as_str()),
            ));
        } else if sides.len() != 1 {
            return Err(Error::inconsistent(
                &self.cardid,
                format!("card has {} {} entries for language {} (expected 1)", sides.len(), what, language.as_str()),
            ));
        }
        Ok(())
    }

    /// File name used by export, `<CARDID>.json` with the id upper-cased
    pub fn file_name(&self) -> String {
        file_name_for(&self.cardid)
    }
}

pub(crate) fn file_name_for(cardid: &str) -> String {
    format!("{}.json", cardid.to_uppercase())
}

/// A card id names exactly one file inside the card directory
pub(crate) fn check_cardid(cardid: &str) -> Result<()> {
    let mut components = Path::new(cardid).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == cardid => Ok(()),
        _ => Err(Error::inconsistent(cardid, "card id is not a plain file name")),
    }
}

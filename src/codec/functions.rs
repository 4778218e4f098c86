//! Text and identifier codecs
//!
//! Each codec has a plain Rust form and an `sql_*` adapter with the
//! registry's function signature. Adapters follow SQLite conventions:
//! NULL in gives NULL out unless noted, and failures are reported as
//! function errors that abort the running statement.

use super::{CodecError, function_error};
use crate::card::CardType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rusqlite::functions::Context;
use rusqlite::types::{Value, ValueRef};
use uuid::Uuid;

/// Encode bytes as standard, padded base64 without line breaks.
/// Empty input has no encoding.
pub fn base64_encode(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    Some(STANDARD.encode(data))
}

/// Decode standard base64; ASCII whitespace anywhere in the input is ignored
pub fn base64_decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// Classify a card type string (case-sensitive)
pub fn card_type(text: Option<&str>) -> CardType {
    text.map(CardType::from_name).unwrap_or(CardType::None)
}

/// Fresh random 128-bit identifier
pub fn new_id() -> [u8; 16] {
    Uuid::new_v4().into_bytes()
}

/// Re-serialize JSON text with 2-space indentation, keeping key order
pub fn pretty_json(text: &str) -> Result<Option<String>, CodecError> {
    if text.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(Some(serde_json::to_string_pretty(&value)?))
}

/// Parse a textual UUID.
///
/// Accepts hyphenated, simple (32 hex digits), `{braced}`, `(parenthesized)`
/// and `urn:uuid:` forms.
pub fn parse_uuid(text: &str) -> Option<[u8; 16]> {
    let text = text.trim();
    let text = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text);
    Uuid::try_parse(text).ok().map(Uuid::into_bytes)
}

/// Lowercase hyphenated form of a 16-byte identifier
pub fn uuid_to_string(bytes: &[u8]) -> Option<String> {
    Uuid::from_slice(bytes).ok().map(|id| id.hyphenated().to_string())
}

/// Argument as text; numbers are rendered the way SQLite would cast them
fn text_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    match ctx.get_raw(idx) {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(r) => Ok(Some(r.to_string())),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|_| function_error(CodecError::InvalidText)),
    }
}

/// Argument as raw bytes
pub(super) fn bytes_arg(ctx: &Context<'_>, idx: usize) -> Option<Vec<u8>> {
    match ctx.get_raw(idx) {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
        ValueRef::Real(r) => Some(r.to_string().into_bytes()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(bytes.to_vec()),
    }
}

pub(super) fn sql_base64decode(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    match text_arg(ctx, 0)? {
        None => Ok(Value::Null),
        Some(text) => base64_decode(&text).map(Value::Blob).map_err(function_error),
    }
}

pub(super) fn sql_base64encode(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let encoded = bytes_arg(ctx, 0).and_then(|data| base64_encode(&data));
    Ok(encoded.map(Value::Text).unwrap_or(Value::Null))
}

pub(super) fn sql_cardtype(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let kind = match ctx.get_raw(0) {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => card_type(std::str::from_utf8(bytes).ok()),
        _ => CardType::None,
    };
    Ok(Value::Integer(kind.code()))
}

pub(super) fn sql_newid(_ctx: &Context<'_>) -> rusqlite::Result<Value> {
    Ok(Value::Blob(new_id().to_vec()))
}

pub(super) fn sql_prettyjson(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let Some(text) = text_arg(ctx, 0)? else {
        return Ok(Value::Null);
    };
    match pretty_json(&text).map_err(function_error)? {
        Some(pretty) => Ok(Value::Text(pretty)),
        None => Ok(Value::Null),
    }
}

pub(super) fn sql_uuid(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let parsed = text_arg(ctx, 0)
        .ok()
        .flatten()
        .and_then(|text| parse_uuid(&text));
    Ok(parsed.map(|bytes| Value::Blob(bytes.to_vec())).unwrap_or(Value::Null))
}

pub(super) fn sql_uuidstr(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let text = bytes_arg(ctx, 0).and_then(|bytes| uuid_to_string(&bytes));
    Ok(text.map(Value::Text).unwrap_or(Value::Null))
}

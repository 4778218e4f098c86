//! Codec Registry - native scalar functions for SQL
//!
//! Functions available to every connection opened by this crate:
//! - base64decode(text), base64encode(blob)
//! - cardtype(text)
//! - newid()
//! - prettyjson(text)
//! - uuid(text), uuidstr(blob)
//! - webpdecode(blob)
//!
//! The registry is built once per process. Its outcome is recorded and
//! every later open checks it before attaching the functions to a new
//! connection.

pub mod bitmap;
pub mod functions;

use crate::{Error, Result};
use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

pub use bitmap::webp_to_bitmap;
pub use functions::{base64_decode, base64_encode, card_type, new_id, parse_uuid, pretty_json, uuid_to_string};

/// Errors raised by codec functions
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode binary data from base-64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid JSON text: {0}")]
    Json(#[from] serde_json::Error),

    #[error("argument is not valid UTF-8 text")]
    InvalidText,

    #[error("invalid webp header: {0}")]
    InvalidImageHeader(String),

    #[error("webp image of {width}x{height} is too large")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("failed to decode webp blob into bgra format: {0}")]
    ImageDecode(String),
}

/// Signature shared by every registered function
pub type ScalarFn = fn(&Context<'_>) -> rusqlite::Result<Value>;

/// One entry of the registry
#[derive(Clone, Copy)]
pub struct ScalarFunction {
    pub name: &'static str,
    pub arity: i32,
    pub deterministic: bool,
    pub func: ScalarFn,
}

impl ScalarFunction {
    const fn new(name: &'static str, arity: i32, deterministic: bool, func: ScalarFn) -> Self {
        Self { name, arity, deterministic, func }
    }

    fn flags(&self) -> FunctionFlags {
        let flags = FunctionFlags::SQLITE_UTF8;
        if self.deterministic { flags | FunctionFlags::SQLITE_DETERMINISTIC } else { flags }
    }
}

impl std::fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("deterministic", &self.deterministic)
            .finish()
    }
}

const FUNCTIONS: &[ScalarFunction] = &[
    ScalarFunction::new("base64decode", 1, true, functions::sql_base64decode),
    ScalarFunction::new("base64encode", 1, true, functions::sql_base64encode),
    ScalarFunction::new("cardtype", 1, true, functions::sql_cardtype),
    ScalarFunction::new("newid", 0, false, functions::sql_newid),
    ScalarFunction::new("prettyjson", 1, true, functions::sql_prettyjson),
    ScalarFunction::new("uuid", 1, true, functions::sql_uuid),
    ScalarFunction::new("uuidstr", 1, true, functions::sql_uuidstr),
    ScalarFunction::new("webpdecode", 1, true, bitmap::sql_webpdecode),
];

/// The validated set of scalar functions
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: Vec<ScalarFunction>,
}

static REGISTRY: OnceLock<std::result::Result<FunctionRegistry, String>> = OnceLock::new();

impl FunctionRegistry {
    /// Build a registry from entries, rejecting duplicate names and bad arity
    pub fn build(entries: &[ScalarFunction]) -> std::result::Result<Self, String> {
        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.name) {
                return Err(format!("scalar function {} is registered twice", entry.name));
            }
            if !(0..=1).contains(&entry.arity) {
                return Err(format!("scalar function {} has unsupported arity {}", entry.name, entry.arity));
            }
        }
        tracing::debug!("Built function registry with {} entries", entries.len());
        Ok(Self { functions: entries.to_vec() })
    }

    pub fn functions(&self) -> &[ScalarFunction] {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Attach every function to a connection
    pub fn register(&self, conn: &Connection) -> Result<()> {
        for entry in &self.functions {
            conn.create_scalar_function(entry.name, entry.arity, entry.flags(), entry.func)?;
        }
        Ok(())
    }
}

/// The process-wide registry; built on first use, outcome recorded for all callers
pub fn registry() -> Result<&'static FunctionRegistry> {
    match REGISTRY.get_or_init(|| FunctionRegistry::build(FUNCTIONS)) {
        Ok(registry) => Ok(registry),
        Err(message) => Err(Error::Registration(message.clone())),
    }
}

/// Attach the process-wide registry to a connection
pub fn register_functions(conn: &Connection) -> Result<()> {
    registry()?.register(conn)
}

/// Wrap a codec failure so SQLite reports it as a function error
pub(crate) fn function_error(err: CodecError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(err))
}

//! Static category registry
//!
//! Every resource category maps to a naming scope and a payload decoder. The
//! table is fixed at compile time; lookups never dispatch on free-form names
//! past [`Category::from_str`].

use crate::error::{Error, Result};
use crate::storage::CollectionKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Fixed resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Content,
    Connections,
    Forms,
    Media,
    Schemas,
    Users,
}

/// Where a category's collection lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `<environment>.<name>`
    Environment,
    /// Held by the platform user directory, shared by all environments of a
    /// project; `<name>` only names its cache slot
    Directory,
}

/// Registry entry for one category
#[derive(Debug)]
pub struct CategorySpec {
    pub category: Category,
    pub name: &'static str,
    pub scope: Scope,
    /// Validate and normalise an incoming payload
    pub decode: fn(Value) -> Result<Value>,
}

static REGISTRY: [CategorySpec; 6] = [
    CategorySpec {
        category: Category::Content,
        name: "content",
        scope: Scope::Environment,
        decode: decode_document,
    },
    CategorySpec {
        category: Category::Connections,
        name: "connections",
        scope: Scope::Environment,
        decode: decode_document,
    },
    CategorySpec {
        category: Category::Forms,
        name: "forms",
        scope: Scope::Environment,
        decode: decode_document,
    },
    CategorySpec {
        category: Category::Media,
        name: "media",
        scope: Scope::Environment,
        decode: decode_document,
    },
    CategorySpec {
        category: Category::Schemas,
        name: "schemas",
        scope: Scope::Environment,
        decode: decode_document,
    },
    CategorySpec {
        category: Category::Users,
        name: "users",
        scope: Scope::Directory,
        decode: decode_user,
    },
];

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Content,
        Category::Connections,
        Category::Forms,
        Category::Media,
        Category::Schemas,
        Category::Users,
    ];

    pub fn spec(self) -> &'static CategorySpec {
        &REGISTRY[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Collection holding this category inside `environment`
    pub fn collection(self, environment: &str) -> CollectionKey {
        match self.spec().scope {
            Scope::Environment => CollectionKey::scoped(environment, self.name()),
            Scope::Directory => CollectionKey::global(self.name()),
        }
    }

    pub fn decode(self, payload: Value) -> Result<Value> {
        (self.spec().decode)(payload)
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|spec| spec.name == s)
            .map(|spec| spec.category)
            .ok_or_else(|| Error::not_found("category", s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_document(payload: Value) -> Result<Value> {
    match payload {
        Value::Object(_) => Ok(payload),
        other => Err(Error::validation(
            "payload",
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
    }
}

fn decode_user(payload: Value) -> Result<Value> {
    let payload = decode_document(payload)?;
    let has_username = payload
        .get("username")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !has_username {
        return Err(Error::validation("payload", "users require a username"));
    }
    Ok(payload)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Key re-casing between application naming (`trackId`) and storage
//! naming (`track_id`).
//!
//! Both directions are pure and total: keys that do not look like an
//! identifier of the source convention are left exactly as they are, and
//! non-object values pass through untouched. Only object keys are ever
//! rewritten, never values.

use crate::core::Row;
use heck::{ToLowerCamelCase, ToSnakeCase};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

lazy_static! {
    // lowerCamelCase with at least one hump; digits allowed anywhere after the first char.
    static ref APPLICATION_KEY: Regex = Regex::new(r"^[a-z][a-z0-9]*[A-Z][A-Za-z0-9]*$").unwrap();
    // snake_case where every segment after an underscore starts with a letter,
    // so `address_1` stays as it is instead of collapsing into `address1`.
    static ref STORAGE_KEY: Regex = Regex::new(r"^[a-z][a-z0-9]*(?:_[a-z][a-z0-9]*)+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToStorage,
    ToApplication,
}

/// Bidirectional, recursive key-case transformer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingConverter;

impl NamingConverter {
    pub fn new() -> Self {
        Self
    }

    /// `fooBar` -> `foo_bar`. Anything else is returned unchanged.
    pub fn storage_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if APPLICATION_KEY.is_match(key) {
            Cow::Owned(key.to_snake_case())
        } else {
            Cow::Borrowed(key)
        }
    }

    /// `foo_bar` -> `fooBar`. Anything else is returned unchanged.
    pub fn application_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if STORAGE_KEY.is_match(key) {
            Cow::Owned(key.to_lower_camel_case())
        } else {
            Cow::Borrowed(key)
        }
    }

    pub fn to_storage_case(&self, value: Value) -> Value {
        self.convert(value, Direction::ToStorage, &[])
    }

    pub fn to_application_case(&self, value: Value) -> Value {
        self.convert(value, Direction::ToApplication, &[])
    }

    /// Re-cases a row for the storage side, leaving the contents of the
    /// `opaque` columns (storage names) untouched.
    pub fn row_to_storage(&self, row: Row, opaque: &[&str]) -> Row {
        self.convert_object(row, Direction::ToStorage, opaque)
    }

    /// Re-cases a row for the application side, leaving the contents of the
    /// `opaque` columns (storage names) untouched.
    pub fn row_to_application(&self, row: Row, opaque: &[&str]) -> Row {
        self.convert_object(row, Direction::ToApplication, opaque)
    }

    fn key<'a>(&self, key: &'a str, direction: Direction) -> Cow<'a, str> {
        match direction {
            Direction::ToStorage => self.storage_key(key),
            Direction::ToApplication => self.application_key(key),
        }
    }

    fn convert(&self, value: Value, direction: Direction, opaque: &[&str]) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.convert_object(map, direction, opaque)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.convert(item, direction, &[]))
                    .collect(),
            ),
            scalar => scalar,
        }
    }

    fn convert_object(&self, map: Row, direction: Direction, opaque: &[&str]) -> Row {
        let mut out = Row::with_capacity(map.len());
        let originals: Vec<String> = map.keys().cloned().collect();

        for (key, value) in map {
            let converted = self.key(&key, direction);
            let target = if converted != key.as_str()
                && (out.contains_key(converted.as_ref())
                    || originals.iter().any(|k| k == converted.as_ref()))
            {
                warn!(
                    "naming collision: '{}' would shadow existing key '{}', keeping it verbatim",
                    key, converted
                );
                key.clone()
            } else {
                converted.into_owned()
            };

            // Opaque columns are named in storage case; on the way to storage
            // that is the converted key, on the way back the original one.
            let storage_name = match direction {
                Direction::ToStorage => target.as_str(),
                Direction::ToApplication => key.as_str(),
            };
            let value = if opaque.contains(&storage_name) {
                value
            } else {
                self.convert(value, direction, &[])
            };

            out.insert(target, value);
        }

        out
    }
}

/// Shorthand for [`NamingConverter::to_storage_case`].
pub fn to_storage_case(value: Value) -> Value {
    NamingConverter.to_storage_case(value)
}

/// Shorthand for [`NamingConverter::to_application_case`].
pub fn to_application_case(value: Value) -> Value {
    NamingConverter.to_application_case(value)
}

//! Field focus: read or replace one nested value inside a recorded response

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::{Result, TapedeckError};

/// Validated dot-path of the form `.a.b.c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot-path
    ///
    /// # Errors
    ///
    /// Returns error unless the input is one or more `.identifier`
    /// segments, identifiers being ASCII letters, digits or `_`
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || TapedeckError::InvalidFieldPath(path.to_string());

        let rest = path.strip_prefix('.').ok_or_else(invalid)?;
        let segments: Vec<String> = rest.split('.').map(str::to_string).collect();

        let well_formed = segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !well_formed {
            return Err(invalid());
        }

        Ok(Self { segments })
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Value at the path, or an empty string when absent
    ///
    /// Non-object values along the way are read as empty objects.
    pub fn extract(&self, target: &Value) -> Value {
        let mut current = target;
        for segment in &self.segments {
            match current.as_object().and_then(|map| map.get(segment)) {
                Some(next) => current = next,
                None => return Value::String(String::new()),
            }
        }
        current.clone()
    }

    /// Copy of `target` with the value at the path replaced
    ///
    /// Missing or non-object intermediates are replaced by objects.
    pub fn inject(&self, target: &Value, value: Value) -> Value {
        inject_owned(target.clone(), &self.segments, value)
    }
}

fn inject_owned(target: Value, segments: &[String], value: Value) -> Value {
    let Some((head, tail)) = segments.split_first() else {
        return value;
    };

    let mut map = match target {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let child = map.remove(head).unwrap_or(Value::Null);
    map.insert(head.clone(), inject_owned(child, tail, value));
    Value::Object(map)
}

impl FromStr for FieldPath {
    type Err = TapedeckError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

//! Ordered property records for ability save/load.
//!
//! Each ability writes a flat record of `(name, value)` pairs terminated by
//! [`SaveToken::EndRecord`]. Records of several abilities are concatenated
//! into one stream; each load pass consumes exactly one record. Readers
//! accept properties in any order, skip names they do not know, and treat
//! missing properties as "keep the initialized value".

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};

/// A saved scalar or array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Fixed-point number (raw bits).
    Fixed(#[serde(with = "fixed_serde")] Fixed),
    /// Text.
    Text(String),
    /// Ground-plane vector.
    Vec2(Vec2Fixed),
    /// Vector with height.
    Vec3(Vec3Fixed),
    /// Text array.
    TextArray(Vec<String>),
}

impl SaveValue {
    /// Boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer payload.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Fixed-point payload. Integers are accepted as whole units.
    #[must_use]
    pub fn as_fixed(&self) -> Option<Fixed> {
        match self {
            Self::Fixed(v) => Some(*v),
            Self::Int(v) => Fixed::checked_from_num(*v),
            _ => None,
        }
    }

    /// Text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// 2D vector payload. A 3D vector drops its height.
    #[must_use]
    pub const fn as_vec2(&self) -> Option<Vec2Fixed> {
        match self {
            Self::Vec2(v) => Some(*v),
            Self::Vec3(v) => Some(v.to_2d()),
            _ => None,
        }
    }

    /// 3D vector payload. A 2D vector gets zero height.
    #[must_use]
    pub const fn as_vec3(&self) -> Option<Vec3Fixed> {
        match self {
            Self::Vec3(v) => Some(*v),
            Self::Vec2(v) => Some(Vec3Fixed::from_2d(*v, Fixed::ZERO)),
            _ => None,
        }
    }

    /// Text array payload.
    #[must_use]
    pub fn as_text_array(&self) -> Option<&[String]> {
        match self {
            Self::TextArray(v) => Some(v),
            _ => None,
        }
    }
}

/// One element of a record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveToken {
    /// A named value.
    Property {
        /// Property name.
        name: String,
        /// Property value.
        value: SaveValue,
    },
    /// End of one ability's record.
    EndRecord,
}

/// Builder for a record stream.
#[derive(Debug, Clone, Default)]
pub struct DetailWriter {
    tokens: Vec<SaveToken>,
}

impl DetailWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write any value.
    pub fn write(&mut self, name: &str, value: SaveValue) {
        self.tokens.push(SaveToken::Property {
            name: name.to_string(),
            value,
        });
    }

    /// Write a boolean.
    pub fn write_bool(&mut self, name: &str, value: bool) {
        self.write(name, SaveValue::Bool(value));
    }

    /// Write an integer.
    pub fn write_int(&mut self, name: &str, value: i64) {
        self.write(name, SaveValue::Int(value));
    }

    /// Write a fixed-point number.
    pub fn write_fixed(&mut self, name: &str, value: Fixed) {
        self.write(name, SaveValue::Fixed(value));
    }

    /// Write text.
    pub fn write_text(&mut self, name: &str, value: impl Into<String>) {
        self.write(name, SaveValue::Text(value.into()));
    }

    /// Write a 2D vector.
    pub fn write_vec2(&mut self, name: &str, value: Vec2Fixed) {
        self.write(name, SaveValue::Vec2(value));
    }

    /// Write a 3D vector.
    pub fn write_vec3(&mut self, name: &str, value: Vec3Fixed) {
        self.write(name, SaveValue::Vec3(value));
    }

    /// Write a text array.
    pub fn write_text_array<S: AsRef<str>>(&mut self, name: &str, values: &[S]) {
        let values = values.iter().map(|s| s.as_ref().to_string()).collect();
        self.write(name, SaveValue::TextArray(values));
    }

    /// Terminate the current record.
    pub fn end_record(&mut self) {
        self.tokens.push(SaveToken::EndRecord);
    }

    /// Tokens written so far.
    #[must_use]
    pub fn tokens(&self) -> &[SaveToken] {
        &self.tokens
    }

    /// Consume the writer.
    #[must_use]
    pub fn into_tokens(self) -> Vec<SaveToken> {
        self.tokens
    }
}

/// Cursor over a record stream.
#[derive(Debug, Clone)]
pub struct DetailReader<'a> {
    tokens: &'a [SaveToken],
    position: usize,
}

impl<'a> DetailReader<'a> {
    /// Read from the start of `tokens`.
    #[must_use]
    pub const fn new(tokens: &'a [SaveToken]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Next property of the current record.
    ///
    /// Returns `None` at the end marker (which is consumed) or at the end
    /// of the stream.
    pub fn next_property(&mut self) -> Option<(&'a str, &'a SaveValue)> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        match token {
            SaveToken::Property { name, value } => Some((name.as_str(), value)),
            SaveToken::EndRecord => None,
        }
    }

    /// Whether every token has been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.position >= self.tokens.len()
    }
}

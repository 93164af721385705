//! Attribute type metadata for indexed columns.

use serde::{Deserialize, Serialize};

/// Scalar type of an indexed attribute.
///
/// The tag is stored in the index header page so a reopened index can be
/// validated against the caller's metadata. Only `Integer` keys are
/// implemented by the index itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttrType {
    /// 32-bit signed integer.
    Integer = 0,
    /// 64-bit IEEE float.
    Double = 1,
    /// Fixed-width character string.
    Varchar = 2,
}

impl AttrType {
    /// Returns the fixed byte size of a value of this type within a record.
    pub fn fixed_size(&self) -> usize {
        match self {
            AttrType::Integer => 4,
            AttrType::Double => 8,
            AttrType::Varchar => 16,
        }
    }

    /// Returns the on-disk tag for this type.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Decodes an on-disk tag, or None if the tag is unknown.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(AttrType::Integer),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::Varchar),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Integer => "INTEGER",
            AttrType::Double => "DOUBLE",
            AttrType::Varchar => "VARCHAR",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(AttrType::Integer.fixed_size(), 4);
        assert_eq!(AttrType::Double.fixed_size(), 8);
        assert_eq!(AttrType::Varchar.fixed_size(), 16);
    }

    #[test]
    fn test_tag_roundtrip() {
        for attr_type in [AttrType::Integer, AttrType::Double, AttrType::Varchar] {
            assert_eq!(AttrType::from_u32(attr_type.as_u32()), Some(attr_type));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(AttrType::from_u32(3), None);
        assert_eq!(AttrType::from_u32(u32::MAX), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(AttrType::Integer.to_string(), "INTEGER");
        assert_eq!(AttrType::Double.to_string(), "DOUBLE");
        assert_eq!(AttrType::Varchar.to_string(), "VARCHAR");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = AttrType::Integer;
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: AttrType = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Row identifiers are database-assigned integers.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_id!(PlayerId);
define_id!(CharacterId);
define_id!(SessionId);

/// External id of a character imported from the predecessor system.
///
/// In `1..=i64::MAX`; `0` is reserved. Stored negated in the `legacy` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct LegacyId(u64);

impl LegacyId {
    pub fn new(value: u64) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::invalid_id("legacy id 0 is reserved"));
        }
        if i64::try_from(value).is_err() {
            return Err(DomainError::invalid_id(format!("legacy id {value} is out of range")));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Value stored in the `legacy` column (negative).
    pub fn column_value(self) -> i64 {
        // `new` bounds the value to i64::MAX, so the fallback is unreachable.
        i64::try_from(self.0)
            .ok()
            .and_then(i64::checked_neg)
            .unwrap_or(i64::MIN)
    }
}

impl TryFrom<u64> for LegacyId {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LegacyId> for u64 {
    fn from(value: LegacyId) -> Self {
        value.0
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a caller addresses a character: positive ids are native rows,
/// negative ids are legacy imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterRef {
    Current(CharacterId),
    Legacy(LegacyId),
}

impl CharacterRef {
    pub fn from_raw(raw: i64) -> Result<Self, DomainError> {
        match raw {
            0 => Err(DomainError::invalid_id("character id 0 is reserved")),
            id if id > 0 => Ok(Self::Current(CharacterId::new(id))),
            id => LegacyId::new(id.unsigned_abs()).map(Self::Legacy),
        }
    }
}

impl std::str::FromStr for CharacterRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| DomainError::parse(format!("Invalid character id: {s}")))?;
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_ids_are_native_rows() {
        assert_eq!(
            CharacterRef::from_raw(42).unwrap(),
            CharacterRef::Current(CharacterId::new(42))
        );
    }

    #[test]
    fn negative_ids_strip_the_sign() {
        let r = CharacterRef::from_raw(-17).unwrap();
        let CharacterRef::Legacy(legacy) = r else {
            panic!("expected legacy ref");
        };
        assert_eq!(legacy.get(), 17);
        assert_eq!(legacy.column_value(), -17);
    }

    #[test]
    fn zero_is_reserved() {
        assert!(CharacterRef::from_raw(0).is_err());
        assert!(LegacyId::new(0).is_err());
        assert!("0".parse::<CharacterRef>().is_err());
    }

    #[test]
    fn parses_from_query_strings() {
        assert_eq!(
            " -3 ".parse::<CharacterRef>().unwrap(),
            CharacterRef::Legacy(LegacyId::new(3).unwrap())
        );
        assert!("abc".parse::<CharacterRef>().is_err());
    }

    #[test]
    fn most_negative_id_is_rejected() {
        assert!("-9223372036854775808".parse::<CharacterRef>().is_err());
        assert!(CharacterRef::from_raw(i64::MIN).is_err());
        assert!(LegacyId::new(1 << 63).is_err());

        let largest = CharacterRef::from_raw(-i64::MAX).unwrap();
        let CharacterRef::Legacy(legacy) = largest else {
            panic!("expected legacy ref");
        };
        assert_eq!(legacy.column_value(), -i64::MAX);
    }

    #[test]
    fn legacy_ids_deserialize_through_validation() {
        assert_eq!(
            serde_json::from_str::<LegacyId>("12").unwrap(),
            LegacyId::new(12).unwrap()
        );
        assert!(serde_json::from_str::<LegacyId>("0").is_err());
        assert!(serde_json::from_str::<LegacyId>("9223372036854775808").is_err());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&PlayerId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}

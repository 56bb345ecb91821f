//! Tri-state patch field.
//!
//! # Invariants
//! - An absent field deserializes to `Unset` (requires `#[serde(default)]`).
//! - An explicit `null` deserializes to `Null`.
//! - Any other value deserializes to `Value`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Partial-update instruction for one nullable field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the stored value untouched.
    #[default]
    Unset,
    /// Clear the stored value.
    Null,
    /// Overwrite the stored value.
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns `None` for `Unset`, otherwise the new nullable value.
    pub fn into_update(self) -> Option<Option<T>> {
        match self {
            Self::Unset => None,
            Self::Null => Some(None),
            Self::Value(value) => Some(Some(value)),
        }
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Self::Unset => Patch::Unset,
            Self::Null => Patch::Null,
            Self::Value(value) => Patch::Value(value),
        }
    }

    /// Writes the instruction into `target`.
    pub fn apply(self, target: &mut Option<T>) {
        if let Some(update) = self.into_update() {
            *target = update;
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Null,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset | Self::Null => serializer.serialize_none(),
            Self::Value(value) => serializer.serialize_some(value),
        }
    }
}

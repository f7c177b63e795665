// Tri-state optional field used by partial updates.
//
// Wire mapping: an absent key is `Unchanged`, an explicit `null` is `Clear`,
// anything else is `Set`. Fields using this type must be declared with
// `#[serde(default, skip_serializing_if = "FieldUpdate::is_unchanged")]` so that
// absent keys stay absent when re-serialized.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate<T> {
    /// Leave the current value as it is.
    Unchanged,
    /// Reset the field to its empty value.
    Clear,
    /// Replace the field with a new value.
    Set(T),
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Unchanged
    }
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }

    /// True when the payload carries this field, either as a value or as a clear.
    pub fn is_present(&self) -> bool {
        !self.is_unchanged()
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            FieldUpdate::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Applies the update to an optional slot.
    pub fn apply_to(&self, target: &mut Option<T>)
    where
        T: Clone,
    {
        match self {
            FieldUpdate::Unchanged => {}
            FieldUpdate::Clear => *target = None,
            FieldUpdate::Set(value) => *target = Some(value.clone()),
        }
    }

    /// Applies the update to a slot whose cleared state is `T::default()`.
    pub fn apply_or_default(&self, target: &mut T)
    where
        T: Clone + Default,
    {
        match self {
            FieldUpdate::Unchanged => {}
            FieldUpdate::Clear => *target = T::default(),
            FieldUpdate::Set(value) => *target = value.clone(),
        }
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => FieldUpdate::Set(value),
            None => FieldUpdate::Clear,
        }
    }
}

// The serialization within the domain is a dependency leak, but the sentinel has to
// survive the wire bit-for-bit and this is the one place that knows its encoding.
impl<T: Serialize> Serialize for FieldUpdate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldUpdate::Set(value) => value.serialize(serializer),
            // Unchanged is skipped by the field attribute and never reaches this arm
            // in a well-formed message.
            FieldUpdate::Clear | FieldUpdate::Unchanged => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldUpdate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Only called when the key is present; absence is handled by `serde(default)`.
        Option::<T>::deserialize(deserializer).map(FieldUpdate::from)
    }
}

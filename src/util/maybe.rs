use serde::{Deserialize, Serialize};

/// A field of a partial update: either supplied (possibly with a `None` value
/// that clears a nullable column) or left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MaybeAbsent<T> {
    Present(T),
    #[serde(skip_serializing)]
    Absent,
}

impl<T> Default for MaybeAbsent<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> MaybeAbsent<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    pub fn as_ref(&self) -> MaybeAbsent<&T> {
        match self {
            MaybeAbsent::Present(v) => MaybeAbsent::Present(v),
            MaybeAbsent::Absent => MaybeAbsent::Absent,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            MaybeAbsent::Present(v) => Some(v),
            MaybeAbsent::Absent => None,
        }
    }

    pub fn if_present<'a, F>(&'a self, f: F)
    where
        F: FnOnce(&'a T),
    {
        if let MaybeAbsent::Present(v) = self {
            f(v);
        }
    }
}

impl<T> From<Option<T>> for MaybeAbsent<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => MaybeAbsent::Present(v),
            None => MaybeAbsent::Absent,
        }
    }
}

// src/models/mod.rs

pub mod catalog;
pub mod inventory;
pub mod organization;
pub mod site;
pub mod stock;

pub use catalog::*;
pub use inventory::*;
pub use organization::*;
pub use site::*;
pub use stock::*;

use serde::{Deserialize, Deserializer};

/// For `Option<Option<T>>` patch fields: absent stays `None`, an explicit
/// `null` becomes `Some(None)`. Pair with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Value of a nullable column after applying a patch field.
pub fn merge_nullable<T: Clone>(patch: &Option<Option<T>>, existing: &Option<T>) -> Option<T> {
    match patch {
        Some(value) => value.clone(),
        None => existing.clone(),
    }
}

//! Built-in verticals.

pub mod construction;
pub mod general;

use crate::vertical::Vertical;
use std::sync::Arc;

pub use construction::ConstructionVertical;
pub use general::GeneralVertical;

/// Looks up a built-in vertical by its id.
pub fn by_id(id: &str) -> Option<Arc<dyn Vertical>> {
    match id {
        "construction" => Some(Arc::new(ConstructionVertical::new())),
        "general" => Some(Arc::new(GeneralVertical::new())),
        _ => None,
    }
}

pub fn ids() -> &'static [&'static str] {
    &["construction", "general"]
}

//! Per-media artwork overrides (custom background and poster).

pub mod api;
pub mod model;
pub mod store;

pub use api::CustomizationApi;
pub use model::{Artwork, CustomizationEntry, MediaId, MediaType};
pub use store::CustomizationStore;

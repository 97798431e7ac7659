//! Organ submodels and the whole-body assembler
//!
//! Every builder is a pure function of the unit catalogue: it returns a fresh,
//! validated [`ModelDefinition`](crate::model::ModelDefinition) with its
//! defaults and its ports. [`body`] embeds the three organs into the
//! circulatory system and [`whole_body`] flattens the result.

pub mod body;
pub mod intestine;
pub mod kidney;
pub mod liver;

pub use body::{body, whole_body, Substance, BLOOD, ORGANS, SUBSTANCES};
pub use intestine::intestine;
pub use kidney::kidney;
pub use liver::liver;

/// Submodel id of the intestine inside the body
pub const INTESTINE: &str = "GU";
/// Submodel id of the liver inside the body
pub const LIVER: &str = "LI";
/// Submodel id of the kidney inside the body
pub const KIDNEY: &str = "KI";

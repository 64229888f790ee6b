//! Model metadata: static capability registry, id normalization and
//! variant selection, and the cached upstream model catalog.

pub mod capabilities;
pub mod catalog;
pub mod identity;

pub use capabilities::{CapabilityRegistry, ModelCapabilities, ReasoningEffort};
pub use catalog::{ModelCatalog, ModelsResponse, UpstreamModel};
pub use identity::{BetaFeatures, VariantSignals, VariantTable};

mod backend;
pub mod backends;
mod labels;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ColorMarker, MarkerBackend, ScriptStep, ScriptedBackend};
pub use labels::{ClassNames, DEFAULT_CLASS_NAMES, DEFAULT_TARGETS};
pub use registry::BackendRegistry;
pub use result::{filter_confident, Detection};

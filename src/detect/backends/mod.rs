pub mod cpu;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use cpu::{ColorMarker, MarkerBackend};
pub use stub::{ScriptStep, ScriptedBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

//! Multi-object tracking.
//!
//! Turns frame-independent detections into stable, identity-preserving tracks:
//! greedy IoU association in track-creation order, damped linear extrapolation
//! across misses, and hit/miss counters that gate confirmation and deletion.
//!
//! Track ids come from a counter owned by each `Tracker`; they increase
//! monotonically and are never reused, and separate trackers never share state.

mod track;
mod tracker;

pub use track::{Track, TrackId, TrackState, HISTORY_LEN};
pub use tracker::{Tracker, TrackerConfig, DEFAULT_IOU_THRESHOLD, PREDICTION_DAMPING};

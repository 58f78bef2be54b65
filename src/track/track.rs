use std::collections::VecDeque;

use crate::detect::Detection;
use crate::geometry::BBox;

/// Number of past boxes kept per track.
pub const HISTORY_LEN: usize = 5;

pub type TrackId = u64;

/// Lifecycle state of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Created from an unmatched detection; not yet rendered.
    Tentative,
    /// Reached `min_hits` and matched in the latest cycle.
    Confirmed,
    /// Reached `min_hits` but unmatched in the latest cycle; coasting on its
    /// predicted box until it matches again or ages out.
    Lost,
}

/// One tracked object.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Working box: last match, or the prediction while coasting.
    pub bbox: BBox,
    pub class_id: u32,
    pub state: TrackState,
    /// Successful matches since creation.
    pub hit_count: u32,
    /// Consecutive cycles without a match.
    pub miss_count: u32,
    /// Most recent observed boxes, oldest first.
    history: VecDeque<BBox>,
}

impl Track {
    pub(crate) fn spawn(id: TrackId, detection: &Detection) -> Self {
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(detection.bbox);
        Self {
            id,
            bbox: detection.bbox,
            class_id: detection.class_id,
            state: TrackState::Tentative,
            hit_count: 0,
            miss_count: 0,
            history,
        }
    }

    /// Observed boxes, oldest first. Predictions are not recorded.
    pub fn history(&self) -> impl Iterator<Item = &BBox> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Confirmed or coasting after confirmation.
    pub fn is_established(&self) -> bool {
        matches!(self.state, TrackState::Confirmed | TrackState::Lost)
    }

    /// Extrapolate the working box and count a miss.
    ///
    /// With two or more observations the per-edge delta between the two most
    /// recent ones, scaled by `damping`, is added to the working box. The
    /// history itself is left alone, so repeated misses keep applying the last
    /// observed velocity.
    pub(crate) fn predict(&mut self, damping: f32) {
        self.miss_count += 1;
        let len = self.history.len();
        if len >= 2 {
            let velocity = self.history[len - 1].edge_delta(&self.history[len - 2]);
            self.bbox = self.bbox.shifted(&velocity, damping);
        }
    }

    /// Apply a matched detection.
    pub(crate) fn hit(&mut self, detection: &Detection) {
        self.bbox = detection.bbox;
        self.class_id = detection.class_id;
        self.hit_count += 1;
        self.miss_count = 0;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(detection.bbox);
    }

    /// Settle the state after a cycle's matching.
    pub(crate) fn refresh_state(&mut self, min_hits: u32) {
        self.state = match self.state {
            TrackState::Tentative if self.hit_count < min_hits => TrackState::Tentative,
            _ if self.miss_count > 0 => TrackState::Lost,
            _ => TrackState::Confirmed,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32) -> Detection {
        Detection::new(BBox::new(x, 0.0, x + 10.0, 10.0), 0, 0.9)
    }

    #[test]
    fn history_is_bounded() {
        let mut track = Track::spawn(1, &det(0.0));
        for i in 1..=10 {
            track.hit(&det(i as f32));
        }
        assert_eq!(track.history_len(), HISTORY_LEN);
        let first = track.history().next().unwrap();
        assert_eq!(first.x1, 6.0);
    }

    #[test]
    fn predict_without_velocity_keeps_box() {
        let mut track = Track::spawn(1, &det(5.0));
        track.predict(0.5);
        assert_eq!(track.bbox, det(5.0).bbox);
        assert_eq!(track.miss_count, 1);
    }

    #[test]
    fn predict_applies_damped_velocity() {
        let mut track = Track::spawn(1, &det(0.0));
        track.hit(&det(4.0));
        track.predict(0.5);
        assert_eq!(track.bbox.x1, 6.0);
        track.predict(0.5);
        assert_eq!(track.bbox.x1, 8.0);
    }

    #[test]
    fn state_follows_hits_and_misses() {
        let mut track = Track::spawn(1, &det(0.0));
        track.refresh_state(2);
        assert_eq!(track.state, TrackState::Tentative);

        track.hit(&det(0.0));
        track.hit(&det(0.0));
        track.refresh_state(2);
        assert_eq!(track.state, TrackState::Confirmed);

        track.predict(0.5);
        track.refresh_state(2);
        assert_eq!(track.state, TrackState::Lost);

        track.hit(&det(0.0));
        track.refresh_state(2);
        assert_eq!(track.state, TrackState::Confirmed);
    }

    #[test]
    fn unconfirmed_track_stays_tentative_while_missing() {
        let mut track = Track::spawn(1, &det(0.0));
        track.predict(0.5);
        track.refresh_state(1);
        assert_eq!(track.state, TrackState::Tentative);
    }
}

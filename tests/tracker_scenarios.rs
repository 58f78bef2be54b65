use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use screen_mosaic::detect::ClassNames;
use screen_mosaic::{
    BBox, Detection, Frame, MosaicEngine, PixelFormat, TrackState, Tracker, TrackerConfig,
};

fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection::new(BBox::new(x1, y1, x2, y2), 0, 0.9)
}

fn tracker(max_age: u32, min_hits: u32) -> Tracker {
    Tracker::new(TrackerConfig {
        max_age,
        min_hits,
        ..TrackerConfig::default()
    })
}

fn gradient_frame(width: u32, height: u32) -> Frame {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x * 5 % 256) as u8, (y * 3 % 256) as u8, 128]);
        }
    }
    Frame::new(pixels, width, height, PixelFormat::Rgb24, 1).unwrap()
}

#[test]
fn steady_detection_keeps_one_id_and_is_pixelated() {
    let mut tracker = tracker(3, 1);
    let detection = face(10.0, 10.0, 50.0, 50.0);

    // A new track starts with zero hits, so it renders from its first match.
    assert!(tracker.update(&[detection]).is_empty());
    let second = tracker.update(&[detection]);
    let third = tracker.update(&[detection]);
    assert_eq!(second.len(), 1);
    assert_eq!(third.len(), 1);
    assert_eq!(second[0].id, third[0].id);
    assert_eq!(tracker.tracks().len(), 1);
    assert_eq!(tracker.tracks()[0].id, third[0].id);
    assert_eq!(third[0].state, TrackState::Confirmed);

    let frame = gradient_frame(100, 100);
    let engine = MosaicEngine::new(["face"], 10, ClassNames::default());
    let out = engine.apply(&frame, &third);
    assert_eq!(out.regions.len(), 1);
    let region = &out.regions[0];
    assert_eq!((region.x, region.y, region.w, region.h), (10, 10, 40, 40));
    assert_eq!(region.label, "face");
    for y in 10..50 {
        for x in 10..50 {
            let origin = (10 + (x - 10) / 10 * 10, 10 + (y - 10) / 10 * 10);
            assert_eq!(out.frame.pixel(x, y), out.frame.pixel(origin.0, origin.1));
        }
    }
    assert_eq!(out.frame.pixel(60, 60), frame.pixel(60, 60));
}

#[test]
fn track_coasts_through_max_age_gaps_then_is_removed() {
    let mut tracker = tracker(3, 1);
    for _ in 0..3 {
        tracker.update(&[face(10.0, 10.0, 50.0, 50.0)]);
    }
    let id = tracker.tracks()[0].id;

    for expected_miss in 1..=3 {
        assert!(tracker.update(&[]).is_empty());
        let track = &tracker.tracks()[0];
        assert_eq!(track.id, id);
        assert_eq!(track.miss_count, expected_miss);
        assert_eq!(track.state, TrackState::Lost);
    }

    // Cycle 7: miss_count 4 > max_age 3.
    tracker.update(&[]);
    assert!(tracker.tracks().is_empty());
}

#[test]
fn coasting_track_follows_its_last_velocity() {
    let mut tracker = tracker(3, 1);
    for step in 0..3 {
        let dx = step as f32 * 4.0;
        tracker.update(&[face(10.0 + dx, 10.0, 50.0 + dx, 50.0)]);
    }
    // Last observed x1 = 18, per-cycle delta 4, damped to 2.
    for (cycle, expected_x1) in [(4, 20.0), (5, 22.0), (6, 24.0)] {
        tracker.update(&[]);
        let bbox = tracker.tracks()[0].bbox;
        assert!(
            (bbox.x1 - expected_x1).abs() < 1e-4,
            "cycle {}: x1 {} != {}",
            cycle,
            bbox.x1,
            expected_x1
        );
        assert!((bbox.width() - 40.0).abs() < 1e-4);
    }
}

#[test]
fn min_hits_three_hides_track_until_third_match() {
    let mut tracker = tracker(3, 3);
    let detection = face(10.0, 10.0, 50.0, 50.0);

    // Creation, then matches one and two.
    for _ in 0..3 {
        assert!(tracker.update(&[detection]).is_empty());
    }
    assert_eq!(tracker.tracks()[0].state, TrackState::Tentative);

    let out = tracker.update(&[detection]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].hit_count, 3);
    assert_eq!(out[0].state, TrackState::Confirmed);
}

#[test]
fn continuously_matched_track_never_ages_out() {
    let mut tracker = tracker(1, 1);
    let detection = face(100.0, 100.0, 160.0, 140.0);
    tracker.update(&[detection]);
    let id = tracker.tracks()[0].id;
    for _ in 0..50 {
        let out = tracker.update(&[detection]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, id);
        assert_eq!(out[0].miss_count, 0);
    }
}

#[test]
fn unmatched_tentative_track_is_deleted_too() {
    let mut tracker = tracker(0, 1);
    tracker.update(&[face(0.0, 0.0, 10.0, 10.0)]);
    tracker.update(&[face(300.0, 300.0, 340.0, 340.0)]);
    let ids: Vec<u64> = tracker.tracks().iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(tracker.tracks()[0].bbox, BBox::new(300.0, 300.0, 340.0, 340.0));
}

#[test]
fn ids_are_unique_and_never_reused() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut tracker = tracker(2, 1);
    let mut highest_seen = 0u64;
    let mut retired: HashSet<u64> = HashSet::new();
    let mut previous: HashSet<u64> = HashSet::new();

    for _ in 0..300 {
        let count = rng.gen_range(0..5);
        let detections: Vec<Detection> = (0..count)
            .map(|_| {
                let x = rng.gen_range(0.0..400.0f32);
                let y = rng.gen_range(0.0..300.0f32);
                let w = rng.gen_range(10.0..80.0f32);
                let h = rng.gen_range(10.0..80.0f32);
                face(x, y, x + w, y + h)
            })
            .collect();
        tracker.update(&detections);

        let active: Vec<u64> = tracker.tracks().iter().map(|t| t.id).collect();
        let unique: HashSet<u64> = active.iter().copied().collect();
        assert_eq!(unique.len(), active.len(), "duplicate active ids");

        for id in &active {
            assert!(!retired.contains(id), "id {} reused after deletion", id);
            if !previous.contains(id) {
                assert!(*id > highest_seen, "new id {} not above {}", id, highest_seen);
                highest_seen = *id;
            }
        }
        retired.extend(previous.difference(&unique).copied());
        previous = unique;
    }
}

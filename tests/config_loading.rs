use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use screen_mosaic::config::MosaicConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MOSAIC_CONFIG",
        "MOSAIC_CAPTURE_URL",
        "MOSAIC_DETECTOR",
        "MOSAIC_MODEL_PATH",
        "MOSAIC_OVERLAY",
        "MOSAIC_TARGETS",
        "MOSAIC_STRENGTH",
        "MOSAIC_CONF_THRESHOLD",
        "MOSAIC_MAX_AGE",
        "MOSAIC_MIN_HITS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "capture": { "url": "stub://desk", "max_fps": 24, "width": 800, "height": 600 },
        "detector": { "backend": "stub", "input_size": 320 },
        "overlay": { "backend": "log", "fps": 20, "width": 400, "height": 300 },
        "pipeline": { "idle_sleep_ms": 5, "stop_timeout_ms": 250 },
        "mosaic": { "strength": 25, "targets": ["face"], "conf_threshold": 0.4 },
        "tracker": { "max_age": 5, "min_hits": 2, "iou_threshold": 0.4 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("MOSAIC_CONFIG", file.path());
    std::env::set_var("MOSAIC_TARGETS", "face, chest");
    std::env::set_var("MOSAIC_MIN_HITS", "3");

    let cfg = MosaicConfig::load().expect("load config");

    assert_eq!(cfg.capture.url, "stub://desk");
    assert_eq!(cfg.capture.max_fps, 24);
    assert_eq!((cfg.capture.width, cfg.capture.height), (800, 600));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.overlay.backend, "log");
    assert_eq!(cfg.overlay.size, Some((400, 300)));
    assert_eq!(cfg.pipeline.idle_sleep, Duration::from_millis(5));
    assert_eq!(cfg.pipeline.stop_timeout, Duration::from_millis(250));
    assert_eq!(cfg.mosaic.strength, 25);
    assert_eq!(cfg.mosaic.targets, vec!["face", "chest"]);
    assert!((cfg.mosaic.conf_threshold - 0.4).abs() < 1e-6);
    assert_eq!(cfg.tracker.max_age, 5);
    assert_eq!(cfg.tracker.min_hits, 3);

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.targets, vec!["face", "chest"]);
    assert_eq!(settings.tracker.min_hits, 3);
    assert_eq!(cfg.surface_settings().fps, 20);
    assert_eq!(cfg.capture_settings().max_fps, 24);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        class_names = ["person", "face"]

        [mosaic]
        strength = 8
        targets = ["face"]

        [tracker]
        max_age = 4
    "#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("MOSAIC_CONFIG", file.path());

    let cfg = MosaicConfig::load().expect("load config");
    assert_eq!(cfg.class_names, vec!["person", "face"]);
    assert_eq!(cfg.mosaic.strength, 8);
    assert_eq!(cfg.tracker.max_age, 4);
    assert_eq!(cfg.tracker.min_hits, 1);
    assert_eq!(cfg.capture.url, "stub://screen");

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = MosaicConfig::load().expect("load config");
    assert_eq!(cfg.detector.backend, "cpu");
    assert_eq!(cfg.overlay.backend, "headless");
    assert_eq!(cfg.mosaic.strength, 15);
    assert_eq!(cfg.mosaic.targets, vec!["face", "chest", "genital", "underwear"]);
    assert_eq!(cfg.tracker.max_age, 3);
    assert_eq!(cfg.tracker.min_hits, 1);
}

#[test]
fn out_of_range_strength_is_clamped() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("MOSAIC_STRENGTH", "2");
    let cfg = MosaicConfig::load().expect("load config");
    assert_eq!(cfg.mosaic.strength, 5);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("MOSAIC_CONF_THRESHOLD", "1.5");
    assert!(MosaicConfig::load().is_err());
    clear_env();

    std::env::set_var("MOSAIC_MAX_AGE", "soon");
    let err = MosaicConfig::load().unwrap_err().to_string();
    assert!(err.contains("MOSAIC_MAX_AGE"));
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "tracker": { "iou_threshold": 0.0 } }"#)
        .expect("write config");
    std::env::set_var("MOSAIC_CONFIG", file.path());
    assert!(MosaicConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::set_var("MOSAIC_CONFIG", file.path());
    let err = MosaicConfig::load().unwrap_err().to_string();
    assert!(err.contains("invalid config file"));

    clear_env();
}

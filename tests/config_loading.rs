use std::sync::Mutex;

use tempfile::NamedTempFile;

use vision_pipeline::config::{PipelineConfig, SourceSpec};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VISION_CONFIG",
        "VISION_INPUT",
        "VISION_OUTPUT_PATH",
        "VISION_WORKERS",
        "VISION_QUEUE_CAPACITY",
        "VISION_FRAME_LIMIT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "display": false,
        "output": true,
        "output_path": "outputs/run.mp4",
        "input": "stub://scene?frames=30",
        "workers": 4,
        "queue_capacity": 8,
        "frame_limit": 30,
        "debug": true
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VISION_CONFIG", file.path());
    std::env::set_var("VISION_WORKERS", "6");
    std::env::set_var("VISION_FRAME_LIMIT", "100");

    let cfg = PipelineConfig::load().expect("load config");

    assert!(cfg.output);
    assert_eq!(cfg.output_path.to_string_lossy(), "outputs/run.mp4");
    assert!(matches!(cfg.input, SourceSpec::Stub(_)));
    assert_eq!(cfg.workers, 6, "env must override file value");
    assert_eq!(cfg.queue_capacity, 8);
    assert_eq!(cfg.frame_limit, 100, "env must override file value");
    assert!(cfg.debug);

    clear_env();
}

#[test]
fn invalid_worker_count_fails_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "workers": 0 }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("VISION_CONFIG", file.path());

    let err = PipelineConfig::load().err().expect("zero workers must fail");
    assert!(err.to_string().contains("worker count"));

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("defaults must load");
    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.queue_capacity, 5);
    assert!(!cfg.output);
    assert!(cfg.unbounded());

    clear_env();
}

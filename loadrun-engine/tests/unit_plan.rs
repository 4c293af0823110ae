use loadrun_common::{ConfigError, RunOptions};
use loadrun_engine::plan::RunPlan;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn workload_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

const PRODUCTS_SCRIPT: &str = r#"{
    "options": { "iterations": 1 },
    "requests": [ { "method": "GET", "url": "http://localhost:8080/products" } ]
}"#;

#[test]
fn test_load_uses_file_options() {
    let file = workload_file(PRODUCTS_SCRIPT);
    let plan = RunPlan::load(file.path(), RunOptions::default(), None).unwrap();

    assert_eq!(plan.config.vus, 1);
    assert_eq!(plan.config.iterations, Some(1));
    assert_eq!(plan.config.duration, None);
    assert_eq!(plan.workload.requests().len(), 1);
    assert!(plan.thresholds.is_empty());
}

#[test]
fn test_command_line_overrides_file_options() {
    let file = workload_file(PRODUCTS_SCRIPT);
    let overrides = RunOptions { vus: Some(10), duration: Some("15s".to_string()), ..Default::default() };
    let plan = RunPlan::load(file.path(), overrides, None).unwrap();

    assert_eq!(plan.config.vus, 10);
    assert_eq!(plan.config.duration, Some(Duration::from_secs(15)));
    // The file's iteration count still applies; whichever limit comes first wins.
    assert_eq!(plan.config.iterations, Some(1));
}

#[test]
fn test_max_error_rate_adds_a_threshold() {
    let file = workload_file(PRODUCTS_SCRIPT);
    let plan = RunPlan::load(file.path(), RunOptions::default(), Some(0.01)).unwrap();

    assert_eq!(plan.thresholds.len(), 1);
    assert_eq!(plan.thresholds[0].to_string(), "http_req_failed: rate<=0.01");
}

#[test]
fn test_load_errors_are_config_errors() {
    let missing = RunPlan::load(Path::new("/nonexistent/script.json"), RunOptions::default(), None);
    assert!(matches!(missing, Err(ConfigError::Workload(_))));

    let no_limit = workload_file(r#"{"requests": [{"url": "http://localhost:8080/products"}]}"#);
    let result = RunPlan::load(no_limit.path(), RunOptions::default(), None);
    assert!(matches!(result, Err(ConfigError::MissingTermination)));

    let zero_vus = workload_file(PRODUCTS_SCRIPT);
    let overrides = RunOptions { vus: Some(0), ..Default::default() };
    let result = RunPlan::load(zero_vus.path(), overrides, None);
    assert!(matches!(result, Err(ConfigError::InvalidVus(0))));

    let bad_threshold = workload_file(
        r#"{"options": {"iterations": 1}, "requests": [{"url": "http://x"}], "thresholds": {"http_reqs": ["lots"]}}"#,
    );
    let result = RunPlan::load(bad_threshold.path(), RunOptions::default(), None);
    assert!(matches!(result, Err(ConfigError::Threshold(_, _))));
}

use async_trait::async_trait;
use jobq::task::{Task, TaskMeta, TaskOutcome, TaskRegistry};
use std::io::Write;
use std::time::Duration;

struct Noop;

#[async_trait]
impl Task for Noop {
    async fn run(&self, _params: &serde_json::Value) -> jobq::Result<TaskOutcome> {
        Ok(TaskOutcome::Cancel)
    }
}

const TASKS: &str = r#"
[[task]]
path = "tasks.report"
timeout_secs = 30
result_ttl_secs = 3600

[[task]]
path = "tasks.once"
cancel_on_retry = true
"#;

#[test]
fn unknown_path_has_defaults_and_does_not_resolve() {
    let registry = TaskRegistry::empty();
    assert_eq!(registry.meta("tasks.nope"), TaskMeta::default());
    assert_eq!(registry.meta("tasks.nope").timeout, Duration::from_secs(300));
    assert_eq!(
        registry.meta("tasks.nope").result_ttl,
        Duration::from_secs(7 * 24 * 3600)
    );
    assert!(matches!(
        registry.resolve("tasks.nope"),
        Err(jobq::Error::TaskNotFound(_))
    ));
}

#[test]
fn metadata_applies_to_registered_tasks() {
    let mut registry = TaskRegistry::empty();
    registry.register("tasks.report", Noop).register("tasks.once", Noop);
    assert_eq!(registry.load_meta_str(TASKS).unwrap(), 2);

    let report = registry.meta("tasks.report");
    assert_eq!(report.timeout, Duration::from_secs(30));
    assert_eq!(report.result_ttl, Duration::from_secs(3600));
    assert!(!report.cancel_on_retry);

    let once = registry.resolve("tasks.once").unwrap();
    assert!(once.meta.cancel_on_retry);
    assert_eq!(once.meta.timeout, Duration::from_secs(300));

    assert_eq!(registry.paths(), vec!["tasks.once", "tasks.report"]);
}

#[test]
fn metadata_loaded_before_registration_is_kept() {
    let mut registry = TaskRegistry::empty();
    registry.load_meta_str(TASKS).unwrap();

    // Known without an implementation.
    assert_eq!(registry.meta("tasks.report").timeout, Duration::from_secs(30));
    assert!(registry.resolve("tasks.report").is_err());

    registry.register("tasks.report", Noop);
    assert_eq!(
        registry.resolve("tasks.report").unwrap().meta.result_ttl,
        Duration::from_secs(3600)
    );
}

#[test]
fn load_meta_file_reads_toml() {
    let path = std::env::temp_dir().join(format!("jobq-tasks-{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(TASKS.as_bytes()).unwrap();
    drop(file);

    let mut registry = TaskRegistry::empty();
    assert_eq!(registry.load_meta_file(&path).unwrap(), 2);
    assert!(registry.meta("tasks.once").cancel_on_retry);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn bad_tasks_file_is_a_config_error() {
    let mut registry = TaskRegistry::empty();
    let err = registry.load_meta_str("[[task]]\ntimeout_secs = 5\n").unwrap_err();
    assert!(matches!(err, jobq::Error::Config(_)));

    let missing = registry
        .load_meta_file(std::path::Path::new("/nonexistent/jobq/tasks.toml"))
        .unwrap_err();
    assert!(matches!(missing, jobq::Error::Config(_)));
}

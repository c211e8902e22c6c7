use sa_domain::config::{Config, TaskBackend};

#[test]
fn default_task_backend_is_memory() {
    let config = Config::default();
    assert_eq!(config.tasks.backend, TaskBackend::Memory);
    assert!(config.tasks.enabled);
}

#[test]
fn explicit_task_section_parses() {
    let toml_str = r#"
[tasks]
enabled = true
backend = "sql"
worker_pool = 8
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.tasks.backend, TaskBackend::Sql);
    assert_eq!(config.tasks.worker_pool, 8);
}

use sg_core::config::{BackendKind, Config};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "pretty");
    assert_eq!(cfg.sessions.max_sessions, 5);
    assert_eq!(cfg.sessions.idle_timeout_secs, 1800);
    assert_eq!(cfg.sessions.default_rows, 24);
    assert_eq!(cfg.sessions.default_cols, 80);
    assert_eq!(cfg.sessions.output_buffer_bytes, 1024 * 1024);
    assert_eq!(cfg.sessions.history_limit, 500);
    assert_eq!(cfg.sessions.backend, BackendKind::Auto);
    assert!(cfg.sessions.shell.is_none());
    assert_eq!(cfg.daemon.host, "127.0.0.1");
    assert_eq!(cfg.daemon.port, 8022);
    assert_eq!(cfg.ssh.service_name, "ssh");
    assert_eq!(cfg.ssh.port, 22);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("max_sessions"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.sessions.max_sessions, cfg.sessions.max_sessions);
    assert_eq!(parsed.daemon.port, cfg.daemon.port);
    assert_eq!(parsed.sessions.backend, cfg.sessions.backend);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[sessions]
max_sessions = 2
shell = "/bin/sh"

[daemon]
port = 1234
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.sessions.max_sessions, 2);
    assert_eq!(cfg.sessions.shell.as_deref(), Some("/bin/sh"));
    assert_eq!(cfg.daemon.port, 1234);
    // defaults should fill in the rest
    assert_eq!(cfg.sessions.history_limit, 500);
    assert_eq!(cfg.general.log_level, "info");
    cfg.validate().expect("config validates");
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sessions]\nidle_timeout_secs = 60\nbackend = \"pty\"\n").unwrap();

    let cfg = Config::load_from(&path).expect("load");
    assert_eq!(cfg.sessions.idle_timeout_secs, 60);
    assert_eq!(cfg.sessions.backend, BackendKind::Pty);
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Config::load_from(dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().starts_with("io:"));
}

#[test]
fn load_from_invalid_values_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sessions]\nhistory_limit = 0\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("history_limit"));
}

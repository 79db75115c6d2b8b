use sg_telemetry::logging::{init, init_logging_json, LogFormat};

#[test]
fn log_format_from_config() {
    assert_eq!(LogFormat::from_config("json"), LogFormat::Json);
    assert_eq!(LogFormat::from_config("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::from_config("pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::from_config("anything"), LogFormat::Pretty);
}

#[test]
fn only_the_first_initialisation_installs() {
    init("logging-test", "debug", LogFormat::Pretty);
    assert!(!init("logging-test", "info", LogFormat::Pretty));
    assert!(!init_logging_json("warn"));
    tracing::info!("still logging after repeated init");
}

use devsim_config::{AppConfig, ConfigError};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("DEVSIM_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("DEVSIM_PREVIEW_ROWS", "3");
        std::env::set_var("DEVSIM_REARM_ON_START", "false");
        std::env::remove_var("DEVSIM_DATABASE_URL");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.preview_rows, 3);
    assert_eq!(config.history_default_limit, 10);
    assert_eq!(config.mqtt_timeout_ms, 10_000);
    assert!(config.database_url.is_none());
    assert!(!config.rearm_on_start);

    unsafe {
        std::env::set_var("DEVSIM_MQTT_TIMEOUT_MS", "soon");
    }
    let err = AppConfig::from_env().expect_err("invalid timeout");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "DEVSIM_MQTT_TIMEOUT_MS"));
    unsafe {
        std::env::remove_var("DEVSIM_MQTT_TIMEOUT_MS");
    }
}

use domain::{
    AuthConfig, ConnectionKind, ConnectionSettings, SessionContext, TransmissionCommand,
    TransmissionState,
};
use serde_json::json;

#[test]
fn session_context_builds() {
    let ctx = SessionContext::new("operator", "req-1", "trace-1");
    assert_eq!(ctx.actor, "operator");
    assert_eq!(ctx.request_id, "req-1");
    assert_eq!(ctx.trace_id, "trace-1");
    assert_eq!(SessionContext::system().actor, "system");
}

#[test]
fn allowed_actions_follow_transition_table() {
    let allowed: Vec<&str> = TransmissionState::Active
        .allowed_commands()
        .into_iter()
        .map(|command| command.as_str())
        .collect();
    assert_eq!(allowed, vec!["enable", "start", "pause", "stop"]);
    assert!(
        TransmissionState::Inactive
            .allowed_commands()
            .contains(&TransmissionCommand::TransmitNow)
    );
}

#[test]
fn invalid_transition_message_names_state() {
    let err = TransmissionState::Manual
        .apply(TransmissionCommand::Resume)
        .expect_err("resume from manual");
    assert_eq!(err.to_string(), "cannot resume while transmission is MANUAL");
}

#[test]
fn auth_config_variants_are_validated() {
    let token = AuthConfig::from_parts("TOKEN", Some(&json!({"token": "abc"}))).expect("token");
    assert_eq!(
        token,
        AuthConfig::Token {
            token: "abc".to_string(),
            token_type: "Bearer".to_string(),
        }
    );
    assert_eq!(token.masked()["token"], "***");
    assert!(AuthConfig::from_parts("USER_PASS", Some(&json!({"username": "u"}))).is_err());
    assert!(AuthConfig::from_parts("OAUTH", None).is_err());

    let api_key = AuthConfig::from_parts("api_key", Some(&json!({"key": "k"}))).expect("api key");
    assert_eq!(api_key.masked()["parameter_name"], "X-API-Key");
    assert_eq!(api_key.masked()["location"], "header");
}

#[test]
fn connection_settings_apply_defaults() {
    let mqtt = ConnectionSettings::from_parts(ConnectionKind::Mqtt, None).expect("mqtt");
    assert_eq!(mqtt.to_value()["keep_alive"], 60);
    assert_eq!(mqtt.to_value()["qos"], 1);

    let https = ConnectionSettings::from_parts(
        ConnectionKind::Https,
        Some(&json!({"method": "put", "headers": {"X-Site": "north"}})),
    )
    .expect("https");
    assert_eq!(https.to_value()["method"], "PUT");
    assert_eq!(https.to_value()["timeout"], 30);
    assert_eq!(https.to_value()["verify_tls"], true);
    assert!(
        ConnectionSettings::from_parts(ConnectionKind::Https, Some(&json!({"method": "TRACE"})))
            .is_err()
    );
}

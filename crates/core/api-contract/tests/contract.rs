use api_contract::{
    ConnectionOverride, ErrorBody, TransmissionConfigRequest, TransmitResponse,
    UpdateConnectionRequest, UpdateProjectRequest,
};
use domain::DeviceType;
use serde_json::json;

#[test]
fn config_request_distinguishes_null_from_missing() {
    let missing: TransmissionConfigRequest =
        serde_json::from_value(json!({"transmission_frequency": 30})).expect("parse");
    assert_eq!(missing.connection_id, None);
    assert_eq!(missing.transmission_frequency, Some(30));

    let cleared: TransmissionConfigRequest =
        serde_json::from_value(json!({"connection_id": null})).expect("parse");
    assert_eq!(cleared.connection_id, Some(None));

    let selected: TransmissionConfigRequest = serde_json::from_value(json!({
        "device_type": "Sensor",
        "transmission_enabled": true,
        "connection_id": "c1"
    }))
    .expect("parse");
    assert_eq!(selected.connection_id, Some(Some("c1".to_string())));
    assert_eq!(selected.device_type, Some(DeviceType::Sensor));
    assert_eq!(selected.transmission_enabled, Some(true));
}

#[test]
fn config_request_rejects_unknown_device_type() {
    let result =
        serde_json::from_value::<TransmissionConfigRequest>(json!({"device_type": "Robot"}));
    assert!(result.is_err());
}

#[test]
fn nullable_update_fields() {
    let update: UpdateConnectionRequest =
        serde_json::from_value(json!({"port": null, "name": "broker"})).expect("parse");
    assert_eq!(update.port, Some(None));
    assert_eq!(update.description, None);

    let update: UpdateProjectRequest =
        serde_json::from_value(json!({"description": "line"})).expect("parse");
    assert_eq!(update.description, Some(Some("line".to_string())));
    assert!(update.name.is_none());
}

#[test]
fn empty_override_body() {
    let body: ConnectionOverride = serde_json::from_value(json!({})).expect("parse");
    assert!(body.connection_id.is_none());
}

#[test]
fn transmit_response_omits_absent_fields() {
    let value = serde_json::to_value(TransmitResponse {
        success: true,
        current_row_index: None,
        last_transmission: Some("2024-01-01T00:00:00.000Z".to_string()),
        error: None,
    })
    .expect("serialize");
    assert_eq!(
        value,
        json!({"success": true, "last_transmission": "2024-01-01T00:00:00.000Z"})
    );
}

#[test]
fn error_body_shape() {
    let value = serde_json::to_value(ErrorBody::new("CONFLICT", "busy")).expect("serialize");
    assert_eq!(value, json!({"error": "busy", "code": "CONFLICT"}));
}

use devsim_storage::DeviceRecord;
use domain::DeviceType;
use serde_json::{Map, Value, json};

/// 构造传输负载。
///
/// Sensor 发送 `row_index` 指向的一行并附加 `timestamp`；WebApp 发送整个数据集。
/// 设备没有数据集时返回 `None`。
pub fn build_payload(device: &DeviceRecord, timestamp: &str) -> Option<Value> {
    let dataset = device.csv_data.as_ref().filter(|dataset| !dataset.is_empty())?;
    let payload = match device.device_type {
        DeviceType::Sensor => {
            let row_index = device.current_row_index as usize;
            let mut data: Map<String, Value> = dataset.row(row_index)?.clone();
            data.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
            json!({
                "device_id": device.reference,
                "device_name": device.name,
                "device_type": device.device_type.as_str(),
                "transmission_timestamp": timestamp,
                "row_index": row_index,
                "data": data,
            })
        }
        DeviceType::WebApp => json!({
            "device_id": device.reference,
            "device_name": device.name,
            "device_type": device.device_type.as_str(),
            "transmission_timestamp": timestamp,
            "data_count": dataset.row_count(),
            "data": dataset.data,
        }),
    };
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CsvDataset, TransmissionState};

    fn device(device_type: DeviceType, rows: usize) -> DeviceRecord {
        let data: Vec<Map<String, Value>> = (0..rows)
            .map(|index| {
                let mut row = Map::new();
                row.insert("value".to_string(), json!(format!("v{index}")));
                row
            })
            .collect();
        DeviceRecord {
            device_id: "d1".to_string(),
            reference: "ABCD1234".to_string(),
            name: "pump".to_string(),
            description: None,
            device_type,
            transmission_frequency: 60,
            transmission_state: TransmissionState::Manual,
            selected_connection_id: None,
            current_row_index: 1,
            csv_data: Some(CsvDataset {
                headers: vec!["value".to_string()],
                csv_preview: Vec::new(),
                json_preview: Vec::new(),
                total_rows: rows,
                data,
            }),
            project_id: None,
            last_transmission_ms: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn sensor_sends_current_row_with_timestamp() {
        let payload = build_payload(&device(DeviceType::Sensor, 3), "2026-01-01T00:00:00.000Z")
            .expect("payload");
        assert_eq!(payload["device_id"], "ABCD1234");
        assert_eq!(payload["row_index"], 1);
        assert_eq!(payload["data"]["value"], "v1");
        assert_eq!(payload["data"]["timestamp"], "2026-01-01T00:00:00.000Z");
    }

    #[test]
    fn webapp_sends_whole_dataset() {
        let payload = build_payload(&device(DeviceType::WebApp, 3), "ts").expect("payload");
        assert_eq!(payload["data_count"], 3);
        assert_eq!(payload["data"].as_array().map(Vec::len), Some(3));
        assert!(payload.get("row_index").is_none());
    }

    #[test]
    fn missing_dataset_yields_none() {
        let mut record = device(DeviceType::Sensor, 0);
        assert!(build_payload(&record, "ts").is_none());
        record.csv_data = None;
        assert!(build_payload(&record, "ts").is_none());
    }
}

use devsim_ingest::{CsvIngestionPipeline, IngestConfig, IngestError};
use devsim_storage::{DeviceRecord, DeviceStore, DeviceUpdate, InMemoryDeviceStore};
use domain::{CsvDataset, DeviceType, SessionContext, TransmissionState};
use std::sync::Arc;

fn ctx() -> SessionContext {
    SessionContext::for_actor("tester")
}

fn device(device_id: &str) -> DeviceRecord {
    DeviceRecord {
        device_id: device_id.to_string(),
        reference: "REF00001".to_string(),
        name: "line sensor".to_string(),
        description: None,
        device_type: DeviceType::Sensor,
        transmission_frequency: 60,
        transmission_state: TransmissionState::Inactive,
        selected_connection_id: None,
        current_row_index: 0,
        csv_data: None,
        project_id: None,
        last_transmission_ms: None,
        created_at_ms: 1,
    }
}

fn csv_with_rows(rows: usize) -> String {
    let mut text = String::from("temperature,humidity\n");
    for index in 0..rows {
        text.push_str(&format!("{},{}\n", 20 + index, 40 + index));
    }
    text
}

async fn setup() -> (Arc<InMemoryDeviceStore>, CsvIngestionPipeline) {
    let store = Arc::new(InMemoryDeviceStore::new());
    store.create_device(&ctx(), device("d1")).await.expect("create");
    let pipeline = CsvIngestionPipeline::new(store.clone(), IngestConfig::default());
    (store, pipeline)
}

#[tokio::test]
async fn stage_builds_preview_without_touching_device() {
    let (store, pipeline) = setup().await;
    let first = pipeline
        .stage(&ctx(), "d1", "readings.csv", csv_with_rows(8).as_bytes())
        .await
        .expect("stage");
    let second = pipeline
        .stage(&ctx(), "d1", "readings.CSV", csv_with_rows(2).as_bytes())
        .await
        .expect("stage again");

    assert_eq!(first.headers, vec!["temperature", "humidity"]);
    assert_eq!(first.total_rows, 8);
    assert_eq!(first.csv_preview.len(), 5);
    assert_eq!(first.json_preview.len(), 5);
    assert_eq!(first.data.len(), 8);
    assert_eq!(first.json_preview[0]["temperature"], "20");
    assert_eq!(second.total_rows, 2);

    let stored = store.find_device(&ctx(), "d1").await.expect("find").expect("device");
    assert!(stored.csv_data.is_none());
}

#[tokio::test]
async fn stage_rejects_bad_files() {
    let (_store, pipeline) = setup().await;
    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("readings.txt", csv_with_rows(1).into_bytes()),
        ("readings.csv", vec![0xff, 0xfe, 0x00]),
        ("readings.csv", b"temperature,humidity\n".to_vec()),
        ("readings.csv", b"".to_vec()),
    ];
    for (name, bytes) in cases {
        let err = pipeline
            .stage(&ctx(), "d1", name, &bytes)
            .await
            .expect_err("format error");
        assert!(matches!(err, IngestError::Format(_)), "{name}: {err}");
    }
}

#[tokio::test]
async fn stage_unknown_device_is_not_found() {
    let (_store, pipeline) = setup().await;
    let err = pipeline
        .stage(&ctx(), "missing", "readings.csv", csv_with_rows(1).as_bytes())
        .await
        .expect_err("not found");
    assert!(matches!(err, IngestError::NotFound(_)));
}

#[tokio::test]
async fn short_rows_are_padded() {
    let (_store, pipeline) = setup().await;
    let staging = pipeline
        .parse("short.csv", b"a,b,c\n1\n")
        .expect("parse");
    assert_eq!(staging.json_preview[0]["b"], "");
    assert_eq!(staging.json_preview[0]["c"], "");
}

#[tokio::test]
async fn recommit_with_fewer_rows_clamps_cursor() {
    let (store, pipeline) = setup().await;
    let ten = pipeline.parse("ten.csv", csv_with_rows(10).as_bytes()).expect("parse");
    let committed = pipeline
        .commit(&ctx(), "d1", ten.into())
        .await
        .expect("commit");
    assert_eq!(committed.current_row_index, 0);
    assert_eq!(committed.row_count(), 10);

    store
        .update_device(
            &ctx(),
            "d1",
            DeviceUpdate {
                current_row_index: Some(7),
                ..DeviceUpdate::default()
            },
        )
        .await
        .expect("update");

    let three = pipeline.parse("three.csv", csv_with_rows(3).as_bytes()).expect("parse");
    let committed = pipeline
        .commit(&ctx(), "d1", three.into())
        .await
        .expect("recommit");
    assert_eq!(committed.current_row_index, 0);
    assert_eq!(committed.row_count(), 3);
}

#[tokio::test]
async fn commit_falls_back_to_json_preview() {
    let (_store, pipeline) = setup().await;
    let staging = pipeline.parse("rows.csv", csv_with_rows(7).as_bytes()).expect("parse");
    let mut dataset: CsvDataset = staging.into();
    dataset.data.clear();
    let device = pipeline.commit(&ctx(), "d1", dataset).await.expect("commit");
    assert_eq!(device.row_count(), 5);
    assert_eq!(device.csv_data.expect("dataset").total_rows, 5);
}

#[tokio::test]
async fn commit_without_rows_is_rejected() {
    let (_store, pipeline) = setup().await;
    let dataset = CsvDataset {
        headers: vec!["a".to_string()],
        csv_preview: Vec::new(),
        json_preview: Vec::new(),
        data: Vec::new(),
        total_rows: 0,
    };
    let err = pipeline
        .commit(&ctx(), "d1", dataset)
        .await
        .expect_err("empty dataset");
    assert!(matches!(err, IngestError::Format(_)));
}

use devsim_storage::{
    HistoryFilter, HistoryScope, InMemoryHistoryStore, ProjectOperationRecord,
    TransmissionHistoryStore, TransmissionRecord,
};
use domain::{BulkOperation, SessionContext, TransmissionStatus, TransmissionType};

fn ctx() -> SessionContext {
    SessionContext::for_actor("tester")
}

fn record(
    id: &str,
    device_id: &str,
    connection_id: &str,
    status: TransmissionStatus,
    ts_ms: i64,
) -> TransmissionRecord {
    TransmissionRecord {
        transmission_id: id.to_string(),
        device_id: device_id.to_string(),
        device_name: format!("device {device_id}"),
        device_reference: "ABCD1234".to_string(),
        project_id: Some("p1".to_string()),
        connection_id: connection_id.to_string(),
        connection_name: format!("conn {connection_id}"),
        status,
        transmission_type: TransmissionType::Manual,
        row_index: Some(0),
        timestamp_ms: ts_ms,
        response_time_ms: Some(5),
        error_message: match status {
            TransmissionStatus::Failed => Some("boom".to_string()),
            TransmissionStatus::Success => None,
        },
    }
}

async fn seeded() -> InMemoryHistoryStore {
    let store = InMemoryHistoryStore::new();
    let entries = [
        record("t1", "d1", "7", TransmissionStatus::Failed, 100),
        record("t2", "d1", "7", TransmissionStatus::Success, 200),
        record("t3", "d1", "8", TransmissionStatus::Failed, 300),
        record("t4", "d1", "7", TransmissionStatus::Failed, 400),
        record("t5", "d2", "7", TransmissionStatus::Failed, 500),
    ];
    for entry in entries {
        store.record(&ctx(), entry).await.expect("record");
    }
    store
}

#[tokio::test]
async fn filters_combine_with_and_most_recent_first() {
    let store = seeded().await;
    let filter = HistoryFilter {
        status: Some(TransmissionStatus::Failed),
        connection_id: Some("7".to_string()),
    };
    let slice = store
        .query(&ctx(), &HistoryScope::Device("d1".to_string()), &filter, 0, None)
        .await
        .expect("query");
    let ids: Vec<&str> = slice
        .records
        .iter()
        .map(|item| item.transmission_id.as_str())
        .collect();
    assert_eq!(ids, vec!["t4", "t1"]);
    assert_eq!(slice.total, 2);
}

#[tokio::test]
async fn pagination_past_end_is_empty() {
    let store = seeded().await;
    let scope = HistoryScope::Device("d1".to_string());
    let page = store
        .query(&ctx(), &scope, &HistoryFilter::default(), 2, Some(2))
        .await
        .expect("query");
    assert_eq!(page.total, 4);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].transmission_id, "t2");

    let empty = store
        .query(&ctx(), &scope, &HistoryFilter::default(), 40, Some(2))
        .await
        .expect("query");
    assert!(empty.records.is_empty());
    assert_eq!(empty.total, 4);
}

#[tokio::test]
async fn project_scope_uses_membership_at_write_time() {
    let store = seeded().await;
    let mut outside = record("t6", "d3", "7", TransmissionStatus::Success, 600);
    outside.project_id = None;
    store.record(&ctx(), outside).await.expect("record");
    let slice = store
        .query(
            &ctx(),
            &HistoryScope::Project("p1".to_string()),
            &HistoryFilter::default(),
            0,
            None,
        )
        .await
        .expect("query");
    assert_eq!(slice.total, 5);
    assert_eq!(slice.records[0].transmission_id, "t5");
}

#[tokio::test]
async fn operations_are_listed_newest_first() {
    let store = InMemoryHistoryStore::new();
    for (index, operation) in [BulkOperation::Start, BulkOperation::Stop].into_iter().enumerate() {
        store
            .record_operation(
                &ctx(),
                ProjectOperationRecord {
                    operation_id: format!("op{index}"),
                    project_id: "p1".to_string(),
                    operation,
                    actor: "tester".to_string(),
                    connection_id: None,
                    total_devices: 2,
                    successful_operations: 1,
                    failed_operations: 1,
                    ts_ms: index as i64,
                },
            )
            .await
            .expect("record");
    }
    let items = store.list_operations(&ctx(), "p1", 10).await.expect("list");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].operation, BulkOperation::Stop);
}

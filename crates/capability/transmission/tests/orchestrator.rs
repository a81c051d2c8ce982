mod common;

use common::{Behaviour, Harness, ctx};
use devsim_storage::{DeviceStore, DeviceUpdate};
use devsim_transmission::{BulkItemStatus, MembershipStatus, TransmissionError};
use domain::{BulkOperation, DeviceType, ProjectTransmissionStatus, TransmissionState};

async fn project_with(harness: &Harness, devices: &[&str]) -> String {
    let project = harness
        .orchestrator
        .create_project(&ctx(), "line 1", None)
        .await
        .expect("create project");
    let ids: Vec<String> = devices.iter().map(|id| id.to_string()).collect();
    let results = harness
        .orchestrator
        .add_devices(&ctx(), &project.project_id, &ids)
        .await
        .expect("add devices");
    assert!(
        results
            .iter()
            .all(|result| result.status == MembershipStatus::Added)
    );
    project.project_id
}

#[tokio::test(start_paused = true)]
async fn start_all_reports_partial_failure() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::Sensor, 0).await;
    harness.add_device("b", DeviceType::Sensor, 3).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a", "b"]).await;

    let outcome = harness
        .orchestrator
        .start_all(&ctx(), &project_id, Some("c1"))
        .await
        .expect("start all");
    assert_eq!(outcome.total_devices, 2);
    assert_eq!(outcome.successful_operations, 1);
    assert_eq!(outcome.failed_operations, 1);
    assert_eq!(outcome.transmission_status, ProjectTransmissionStatus::Active);
    let failed = outcome
        .results
        .iter()
        .find(|result| result.status == BulkItemStatus::Failed)
        .expect("failed item");
    assert_eq!(failed.device_id, "a");

    assert_eq!(
        harness.device("b").await.transmission_state,
        TransmissionState::Active
    );
    assert_eq!(
        harness.device("a").await.transmission_state,
        TransmissionState::Inactive
    );
    harness
        .orchestrator
        .stop_all(&ctx(), &project_id)
        .await
        .expect("stop all");
}

#[tokio::test(start_paused = true)]
async fn stop_all_forces_inactive_even_without_successes() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a"]).await;
    harness
        .orchestrator
        .start_all(&ctx(), &project_id, Some("c1"))
        .await
        .expect("start all");

    let paused = harness
        .orchestrator
        .pause_all(&ctx(), &project_id)
        .await
        .expect("pause all");
    assert_eq!(paused.transmission_status, ProjectTransmissionStatus::Paused);

    let stopped = harness
        .orchestrator
        .stop_all(&ctx(), &project_id)
        .await
        .expect("stop all");
    assert_eq!(stopped.transmission_status, ProjectTransmissionStatus::Inactive);
    assert_eq!(
        harness.device("a").await.transmission_state,
        TransmissionState::Inactive
    );
    assert_eq!(harness.controller.scheduler().armed_count(), 0);

    let empty = harness
        .orchestrator
        .create_project(&ctx(), "empty", None)
        .await
        .expect("create");
    let outcome = harness
        .orchestrator
        .stop_all(&ctx(), &empty.project_id)
        .await
        .expect("stop empty");
    assert_eq!(outcome.total_devices, 0);
    assert_eq!(outcome.transmission_status, ProjectTransmissionStatus::Inactive);
}

#[tokio::test(start_paused = true)]
async fn resume_all_without_successes_keeps_status() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    let project_id = project_with(&harness, &["a"]).await;

    let outcome = harness
        .orchestrator
        .resume_all(&ctx(), &project_id, None)
        .await
        .expect("resume all");
    assert_eq!(outcome.failed_operations, 1);
    assert_eq!(outcome.transmission_status, ProjectTransmissionStatus::Inactive);
}

#[tokio::test]
async fn inactive_override_fails_the_whole_call() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    harness.add_connection("off", false).await;
    let project_id = project_with(&harness, &["a"]).await;

    let err = harness
        .orchestrator
        .start_all(&ctx(), &project_id, Some("off"))
        .await
        .expect_err("inactive override");
    assert!(matches!(err, TransmissionError::Validation(_)));
    let operations = harness
        .orchestrator
        .operations(&ctx(), &project_id, 10)
        .await
        .expect("operations");
    assert!(operations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn bulk_operations_are_recorded_newest_first() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a"]).await;
    harness
        .orchestrator
        .start_all(&ctx(), &project_id, Some("c1"))
        .await
        .expect("start all");
    harness
        .orchestrator
        .stop_all(&ctx(), &project_id)
        .await
        .expect("stop all");

    let operations = harness
        .orchestrator
        .operations(&ctx(), &project_id, 10)
        .await
        .expect("operations");
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].operation, BulkOperation::Stop);
    assert_eq!(operations[1].operation, BulkOperation::Start);
    assert_eq!(operations[1].connection_id.as_deref(), Some("c1"));
    assert_eq!(operations[1].actor, "tester");
}

#[tokio::test]
async fn membership_is_exclusive() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 0).await;
    let first = project_with(&harness, &["a"]).await;
    let second = harness
        .orchestrator
        .create_project(&ctx(), "line 2", None)
        .await
        .expect("create");

    let results = harness
        .orchestrator
        .add_devices(
            &ctx(),
            &second.project_id,
            &["a".to_string(), "ghost".to_string()],
        )
        .await
        .expect("add");
    assert_eq!(results[0].status, MembershipStatus::Conflict);
    assert_eq!(results[1].status, MembershipStatus::NotFound);

    let results = harness
        .orchestrator
        .add_devices(&ctx(), &first, &["a".to_string()])
        .await
        .expect("add again");
    assert_eq!(results[0].status, MembershipStatus::AlreadyMember);

    let err = harness
        .orchestrator
        .remove_device(&ctx(), &second.project_id, "a")
        .await
        .expect_err("not a member");
    assert!(matches!(err, TransmissionError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn remove_device_stops_and_releases() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a"]).await;
    harness.controller.start(&ctx(), "a", "c1").await.expect("start");

    let released = harness
        .orchestrator
        .remove_device(&ctx(), &project_id, "a")
        .await
        .expect("remove");
    assert!(released.project_id.is_none());
    assert_eq!(released.transmission_state, TransmissionState::Inactive);
    assert!(harness.controller.scheduler().scheduled_connection("a").is_none());
}

#[tokio::test(start_paused = true)]
async fn delete_project_releases_members() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 2).await;
    harness.add_device("b", DeviceType::WebApp, 2).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a", "b"]).await;
    harness
        .orchestrator
        .start_all(&ctx(), &project_id, Some("c1"))
        .await
        .expect("start all");

    harness
        .orchestrator
        .delete_project(&ctx(), &project_id)
        .await
        .expect("delete");
    for id in ["a", "b"] {
        let device = harness.device(id).await;
        assert!(device.project_id.is_none());
        assert_eq!(device.transmission_state, TransmissionState::Inactive);
    }
    let err = harness
        .orchestrator
        .get_project(&ctx(), &project_id)
        .await
        .expect_err("gone");
    assert!(matches!(err, TransmissionError::NotFound(_)));
}

#[tokio::test]
async fn project_names_are_validated_and_unique() {
    let harness = Harness::new();
    harness
        .orchestrator
        .create_project(&ctx(), "line 1", None)
        .await
        .expect("create");
    let err = harness
        .orchestrator
        .create_project(&ctx(), "  line 1 ", None)
        .await
        .expect_err("duplicate");
    assert!(matches!(err, TransmissionError::Conflict(_)));
    let err = harness
        .orchestrator
        .create_project(&ctx(), "   ", None)
        .await
        .expect_err("blank");
    assert!(matches!(err, TransmissionError::Validation(_)));
    let err = harness
        .orchestrator
        .create_project(&ctx(), &"x".repeat(101), None)
        .await
        .expect_err("too long");
    assert!(matches!(err, TransmissionError::Validation(_)));
}

#[tokio::test]
async fn validate_lists_issues_per_device() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::WebApp, 0).await;
    harness.add_device("b", DeviceType::WebApp, 2).await;
    harness.add_connection("c1", true).await;
    harness
        .devices
        .update_device(
            &ctx(),
            "b",
            DeviceUpdate {
                selected_connection_id: Some(Some("c1".to_string())),
                ..DeviceUpdate::default()
            },
        )
        .await
        .expect("update");
    let project_id = project_with(&harness, &["a", "b"]).await;

    let validation = harness
        .orchestrator
        .validate(&ctx(), &project_id)
        .await
        .expect("validate");
    assert!(!validation.ready);
    assert_eq!(validation.total_devices, 2);
    assert_eq!(validation.ready_devices, 1);
    let a = validation
        .devices
        .iter()
        .find(|item| item.device_id == "a")
        .expect("a");
    assert_eq!(a.issues.len(), 2);
}

#[tokio::test]
async fn stats_compute_success_rate() {
    let harness = Harness::new();
    harness.add_device("a", DeviceType::Sensor, 3).await;
    harness.add_connection("c1", true).await;
    let project_id = project_with(&harness, &["a"]).await;

    for behaviour in [
        Behaviour::Succeed,
        Behaviour::Succeed,
        Behaviour::Fail,
    ] {
        harness.transport.set(behaviour);
        harness
            .controller
            .transmit_now(&ctx(), "a", "c1")
            .await
            .expect("transmit");
    }

    let stats = harness
        .orchestrator
        .stats(&ctx(), &project_id)
        .await
        .expect("stats");
    assert_eq!(stats.total_transmissions, 3);
    assert_eq!(stats.successful_transmissions, 2);
    assert_eq!(stats.failed_transmissions, 1);
    assert_eq!(stats.success_rate, 66.67);
    assert_eq!(stats.devices[0].total_transmissions, 3);
}

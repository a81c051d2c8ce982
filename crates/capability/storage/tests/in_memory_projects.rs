use devsim_storage::{InMemoryProjectStore, ProjectRecord, ProjectStore, ProjectUpdate};
use domain::{ProjectTransmissionStatus, SessionContext};

fn ctx() -> SessionContext {
    SessionContext::for_actor("tester")
}

fn project(project_id: &str, name: &str) -> ProjectRecord {
    ProjectRecord {
        project_id: project_id.to_string(),
        name: name.to_string(),
        description: None,
        transmission_status: ProjectTransmissionStatus::Inactive,
        created_at_ms: 0,
    }
}

#[tokio::test]
async fn project_names_are_unique() {
    let store = InMemoryProjectStore::new();
    store.create_project(&ctx(), project("p1", "alpha")).await.expect("create");
    store.create_project(&ctx(), project("p2", "beta")).await.expect("create");
    assert!(store.create_project(&ctx(), project("p3", "alpha")).await.is_err());
    let rename = store
        .update_project(
            &ctx(),
            "p2",
            ProjectUpdate {
                name: Some("alpha".to_string()),
                ..ProjectUpdate::default()
            },
        )
        .await;
    assert!(rename.is_err());
}

#[tokio::test]
async fn transmission_status_is_written() {
    let store = InMemoryProjectStore::new();
    store.create_project(&ctx(), project("p1", "alpha")).await.expect("create");
    let updated = store
        .set_transmission_status(&ctx(), "p1", ProjectTransmissionStatus::Active)
        .await
        .expect("status")
        .expect("project");
    assert_eq!(updated.transmission_status, ProjectTransmissionStatus::Active);
    assert!(
        store
            .set_transmission_status(&ctx(), "missing", ProjectTransmissionStatus::Active)
            .await
            .expect("status")
            .is_none()
    );
}

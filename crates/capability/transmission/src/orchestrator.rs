//! 项目级传输编排。
//!
//! 批量操作对每个成员设备并发执行对应的控制器操作，单个设备失败不会中断整批；
//! 每次批量调用结束后推导项目状态并追加一条聚合操作记录。

use crate::controller::DeviceTransmissionController;
use crate::{TransmissionError, now_epoch_ms};
use devsim_storage::{
    AssignOutcome, DeviceRecord, DeviceStore, HistoryFilter, HistoryScope, ProjectOperationRecord,
    ProjectRecord, ProjectStore, ProjectUpdate, TransmissionHistoryStore,
};
use devsim_telemetry::record_bulk_operation;
use domain::{
    BulkOperation, ProjectTransmissionStatus, SessionContext, TransmissionState,
    TransmissionStatus,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const PROJECT_NAME_MAX: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkItemStatus {
    Success,
    Failed,
}

/// 批量操作中单个设备的结果。
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub device_id: String,
    pub device_name: String,
    pub status: BulkItemStatus,
    pub message: String,
}

/// 批量操作汇总。
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub project_id: String,
    pub operation: BulkOperation,
    pub total_devices: u32,
    pub successful_operations: u32,
    pub failed_operations: u32,
    pub transmission_status: ProjectTransmissionStatus,
    pub results: Vec<BulkResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Added,
    AlreadyMember,
    Conflict,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipResult {
    pub device_id: String,
    pub status: MembershipStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReadiness {
    pub device_id: String,
    pub device_name: String,
    pub ready: bool,
    pub issues: Vec<String>,
}

/// 项目传输就绪检查。
#[derive(Debug, Clone, Serialize)]
pub struct ProjectValidation {
    pub project_id: String,
    pub ready: bool,
    pub total_devices: usize,
    pub ready_devices: usize,
    pub devices: Vec<DeviceReadiness>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceTransmissionStats {
    pub device_id: String,
    pub device_name: String,
    pub transmission_state: TransmissionState,
    pub total_transmissions: u64,
    pub successful_transmissions: u64,
    pub failed_transmissions: u64,
    pub last_transmission_ms: Option<i64>,
}

/// 项目传输统计。
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStats {
    pub project_id: String,
    pub transmission_status: ProjectTransmissionStatus,
    pub total_devices: usize,
    pub active_devices: usize,
    pub paused_devices: usize,
    pub total_transmissions: u64,
    pub successful_transmissions: u64,
    pub failed_transmissions: u64,
    /// 成功率百分比，保留两位小数。
    pub success_rate: f64,
    pub devices: Vec<DeviceTransmissionStats>,
}

/// 项目传输编排器。
#[derive(Clone)]
pub struct ProjectTransmissionOrchestrator {
    project_store: Arc<dyn ProjectStore>,
    device_store: Arc<dyn DeviceStore>,
    history_store: Arc<dyn TransmissionHistoryStore>,
    controller: DeviceTransmissionController,
}

impl ProjectTransmissionOrchestrator {
    pub fn new(
        project_store: Arc<dyn ProjectStore>,
        device_store: Arc<dyn DeviceStore>,
        history_store: Arc<dyn TransmissionHistoryStore>,
        controller: DeviceTransmissionController,
    ) -> Self {
        Self {
            project_store,
            device_store,
            history_store,
            controller,
        }
    }

    pub async fn start_all(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        connection_id: Option<&str>,
    ) -> Result<BulkOutcome, TransmissionError> {
        self.run_bulk(ctx, project_id, BulkOperation::Start, connection_id)
            .await
    }

    pub async fn pause_all(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<BulkOutcome, TransmissionError> {
        self.run_bulk(ctx, project_id, BulkOperation::Pause, None)
            .await
    }

    pub async fn resume_all(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        connection_id: Option<&str>,
    ) -> Result<BulkOutcome, TransmissionError> {
        self.run_bulk(ctx, project_id, BulkOperation::Resume, connection_id)
            .await
    }

    pub async fn stop_all(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<BulkOutcome, TransmissionError> {
        self.run_bulk(ctx, project_id, BulkOperation::Stop, None)
            .await
    }

    /// 批量操作主流程。
    pub async fn run_bulk(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        operation: BulkOperation,
        connection_id: Option<&str>,
    ) -> Result<BulkOutcome, TransmissionError> {
        let project = self.load_project(ctx, project_id).await?;
        // 覆盖连接必须整体有效，否则整个调用失败。
        if let Some(connection_id) = connection_id {
            self.controller.active_connection(ctx, connection_id).await?;
        }
        let devices = self.device_store.list_project_devices(ctx, project_id).await?;
        let results: Vec<BulkResult> = join_all(
            devices
                .iter()
                .map(|device| self.apply_one(ctx, device, operation, connection_id)),
        )
        .await;

        let successful = results
            .iter()
            .filter(|result| result.status == BulkItemStatus::Success)
            .count();
        let failed = results.len() - successful;
        let transmission_status = match operation.derived_status(successful) {
            Some(status) => {
                self.project_store
                    .set_transmission_status(ctx, project_id, status)
                    .await?;
                status
            }
            None => project.transmission_status,
        };

        let operation_record = ProjectOperationRecord {
            operation_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            operation,
            actor: ctx.actor.clone(),
            connection_id: connection_id.map(str::to_string),
            total_devices: results.len() as u32,
            successful_operations: successful as u32,
            failed_operations: failed as u32,
            ts_ms: now_epoch_ms(),
        };
        self.history_store
            .record_operation(ctx, operation_record)
            .await?;
        record_bulk_operation();
        info!(
            target: "devsim.orchestrator",
            project_id = %project_id,
            actor = %ctx.actor,
            operation = %operation.as_str(),
            total_devices = results.len(),
            successful = successful,
            failed = failed,
            status = %transmission_status.as_str(),
            "bulk_operation_completed"
        );
        Ok(BulkOutcome {
            project_id: project_id.to_string(),
            operation,
            total_devices: results.len() as u32,
            successful_operations: successful as u32,
            failed_operations: failed as u32,
            transmission_status,
            results,
        })
    }

    async fn apply_one(
        &self,
        ctx: &SessionContext,
        device: &DeviceRecord,
        operation: BulkOperation,
        connection_id: Option<&str>,
    ) -> BulkResult {
        let result = match operation {
            BulkOperation::Start => {
                match connection_id.or(device.selected_connection_id.as_deref()) {
                    Some(connection_id) => self
                        .controller
                        .start(ctx, &device.device_id, connection_id)
                        .await
                        .map(|_| "transmission started"),
                    None => Err(TransmissionError::Validation(
                        "device has no selected connection".to_string(),
                    )),
                }
            }
            BulkOperation::Pause => self
                .controller
                .pause(ctx, &device.device_id)
                .await
                .map(|_| "transmission paused"),
            BulkOperation::Resume => self
                .controller
                .resume(ctx, &device.device_id, connection_id)
                .await
                .map(|_| "transmission resumed"),
            BulkOperation::Stop => self
                .controller
                .stop(ctx, &device.device_id)
                .await
                .map(|_| "transmission stopped"),
        };
        match result {
            Ok(message) => BulkResult {
                device_id: device.device_id.clone(),
                device_name: device.name.clone(),
                status: BulkItemStatus::Success,
                message: message.to_string(),
            },
            Err(err) => {
                warn!(
                    target: "devsim.orchestrator",
                    device_id = %device.device_id,
                    operation = %operation.as_str(),
                    error = %err,
                    "bulk_device_failed"
                );
                BulkResult {
                    device_id: device.device_id.clone(),
                    device_name: device.name.clone(),
                    status: BulkItemStatus::Failed,
                    message: err.to_string(),
                }
            }
        }
    }

    /// 加入设备；已属于其他项目的设备以冲突拒绝。
    pub async fn add_devices(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        device_ids: &[String],
    ) -> Result<Vec<MembershipResult>, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        let mut results = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            let outcome = self
                .device_store
                .assign_project(ctx, device_id, project_id)
                .await?;
            let (status, message) = match outcome {
                AssignOutcome::Assigned(_) => {
                    (MembershipStatus::Added, "device added to project".to_string())
                }
                AssignOutcome::AlreadyMember => (
                    MembershipStatus::AlreadyMember,
                    "device is already a member of this project".to_string(),
                ),
                AssignOutcome::OwnedByOther(owner) => (
                    MembershipStatus::Conflict,
                    format!("device belongs to project {owner}"),
                ),
                AssignOutcome::NotFound => {
                    (MembershipStatus::NotFound, "device not found".to_string())
                }
            };
            results.push(MembershipResult {
                device_id: device_id.clone(),
                status,
                message,
            });
        }
        let added = results
            .iter()
            .filter(|result| result.status == MembershipStatus::Added)
            .count();
        info!(
            target: "devsim.orchestrator",
            project_id = %project_id,
            requested = device_ids.len(),
            added = added,
            "project_devices_added"
        );
        Ok(results)
    }

    /// 移除成员设备，并停止其自动传输。
    pub async fn remove_device(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        device_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        let device = self
            .device_store
            .find_device(ctx, device_id)
            .await?
            .filter(|device| device.project_id.as_deref() == Some(project_id))
            .ok_or_else(|| {
                TransmissionError::NotFound(format!(
                    "device {device_id} is not a member of project {project_id}"
                ))
            })?;
        self.controller.stop(ctx, &device.device_id).await?;
        let released = self
            .device_store
            .release_project(ctx, device_id, project_id)
            .await?
            .ok_or_else(|| {
                TransmissionError::NotFound(format!(
                    "device {device_id} is not a member of project {project_id}"
                ))
            })?;
        info!(target: "devsim.orchestrator", project_id = %project_id, device_id = %device_id, "project_device_removed");
        Ok(released)
    }

    pub async fn list_projects(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<ProjectRecord>, TransmissionError> {
        Ok(self.project_store.list_projects(ctx).await?)
    }

    /// 项目及其成员设备。
    pub async fn get_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<(ProjectRecord, Vec<DeviceRecord>), TransmissionError> {
        let project = self.load_project(ctx, project_id).await?;
        let devices = self.device_store.list_project_devices(ctx, project_id).await?;
        Ok((project, devices))
    }

    pub async fn project_devices(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Vec<DeviceRecord>, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        Ok(self.device_store.list_project_devices(ctx, project_id).await?)
    }

    pub async fn create_project(
        &self,
        ctx: &SessionContext,
        name: &str,
        description: Option<String>,
    ) -> Result<ProjectRecord, TransmissionError> {
        let name = normalize_project_name(name)?;
        self.ensure_name_free(ctx, &name, None).await?;
        let record = ProjectRecord {
            project_id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            transmission_status: ProjectTransmissionStatus::Inactive,
            created_at_ms: now_epoch_ms(),
        };
        let record = self.project_store.create_project(ctx, record).await?;
        info!(target: "devsim.orchestrator", project_id = %record.project_id, actor = %ctx.actor, "project_created");
        Ok(record)
    }

    pub async fn update_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        name: Option<&str>,
        description: Option<Option<String>>,
    ) -> Result<ProjectRecord, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        let name = match name {
            Some(name) => {
                let name = normalize_project_name(name)?;
                self.ensure_name_free(ctx, &name, Some(project_id)).await?;
                Some(name)
            }
            None => None,
        };
        self.project_store
            .update_project(ctx, project_id, ProjectUpdate { name, description })
            .await?
            .ok_or_else(|| project_not_found(project_id))
    }

    /// 删除项目：先停止全部成员传输并释放设备。
    pub async fn delete_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<(), TransmissionError> {
        self.load_project(ctx, project_id).await?;
        let devices = self.device_store.list_project_devices(ctx, project_id).await?;
        for device in &devices {
            self.controller.stop(ctx, &device.device_id).await?;
            self.device_store
                .release_project(ctx, &device.device_id, project_id)
                .await?;
        }
        if !self.project_store.delete_project(ctx, project_id).await? {
            return Err(project_not_found(project_id));
        }
        info!(
            target: "devsim.orchestrator",
            project_id = %project_id,
            released_devices = devices.len(),
            actor = %ctx.actor,
            "project_deleted"
        );
        Ok(())
    }

    /// 检查每个成员设备是否具备传输条件。
    pub async fn validate(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<ProjectValidation, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        let devices = self.device_store.list_project_devices(ctx, project_id).await?;
        let mut readiness = Vec::with_capacity(devices.len());
        for device in &devices {
            let mut issues = Vec::new();
            if !device.has_dataset() {
                issues.push("no CSV data loaded".to_string());
            }
            match device.selected_connection_id.as_deref() {
                None => issues.push("no connection selected".to_string()),
                Some(connection_id) => {
                    if let Err(err) = self.controller.active_connection(ctx, connection_id).await {
                        match err {
                            TransmissionError::Storage(err) => return Err(err.into()),
                            other => issues.push(other.to_string()),
                        }
                    }
                }
            }
            readiness.push(DeviceReadiness {
                device_id: device.device_id.clone(),
                device_name: device.name.clone(),
                ready: issues.is_empty(),
                issues,
            });
        }
        let ready_devices = readiness.iter().filter(|item| item.ready).count();
        Ok(ProjectValidation {
            project_id: project_id.to_string(),
            ready: !readiness.is_empty() && ready_devices == readiness.len(),
            total_devices: readiness.len(),
            ready_devices,
            devices: readiness,
        })
    }

    /// 项目传输统计（基于写入时归属该项目的历史记录）。
    pub async fn stats(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<ProjectStats, TransmissionError> {
        let project = self.load_project(ctx, project_id).await?;
        let devices = self.device_store.list_project_devices(ctx, project_id).await?;
        let history = self
            .history_store
            .query(
                ctx,
                &HistoryScope::Project(project_id.to_string()),
                &HistoryFilter::default(),
                0,
                None,
            )
            .await?;

        let mut per_device: HashMap<String, DeviceTransmissionStats> = devices
            .iter()
            .map(|device| {
                (
                    device.device_id.clone(),
                    DeviceTransmissionStats {
                        device_id: device.device_id.clone(),
                        device_name: device.name.clone(),
                        transmission_state: device.transmission_state,
                        last_transmission_ms: device.last_transmission_ms,
                        ..DeviceTransmissionStats::default()
                    },
                )
            })
            .collect();
        let mut successful = 0u64;
        for record in &history.records {
            let success = record.status == TransmissionStatus::Success;
            if success {
                successful += 1;
            }
            // 已离开项目的设备仍计入项目总数，但不出现在设备明细中。
            if let Some(stats) = per_device.get_mut(&record.device_id) {
                stats.total_transmissions += 1;
                if success {
                    stats.successful_transmissions += 1;
                } else {
                    stats.failed_transmissions += 1;
                }
            }
        }
        let total = history.records.len() as u64;
        let success_rate = if total == 0 {
            0.0
        } else {
            (successful as f64 * 10_000.0 / total as f64).round() / 100.0
        };
        let mut device_stats: Vec<DeviceTransmissionStats> = devices
            .iter()
            .filter_map(|device| per_device.remove(&device.device_id))
            .collect();
        device_stats.sort_by(|a, b| b.total_transmissions.cmp(&a.total_transmissions));

        Ok(ProjectStats {
            project_id: project_id.to_string(),
            transmission_status: project.transmission_status,
            total_devices: devices.len(),
            active_devices: devices
                .iter()
                .filter(|device| device.transmission_state == TransmissionState::Active)
                .count(),
            paused_devices: devices
                .iter()
                .filter(|device| device.transmission_state == TransmissionState::Paused)
                .count(),
            total_transmissions: total,
            successful_transmissions: successful,
            failed_transmissions: total - successful,
            success_rate,
            devices: device_stats,
        })
    }

    /// 批量操作记录（新到旧）。
    pub async fn operations(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        limit: u64,
    ) -> Result<Vec<ProjectOperationRecord>, TransmissionError> {
        self.load_project(ctx, project_id).await?;
        Ok(self
            .history_store
            .list_operations(ctx, project_id, limit)
            .await?)
    }

    async fn load_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<ProjectRecord, TransmissionError> {
        self.project_store
            .find_project(ctx, project_id)
            .await?
            .ok_or_else(|| project_not_found(project_id))
    }

    async fn ensure_name_free(
        &self,
        ctx: &SessionContext,
        name: &str,
        current_project_id: Option<&str>,
    ) -> Result<(), TransmissionError> {
        match self.project_store.find_by_name(ctx, name).await? {
            Some(existing) if Some(existing.project_id.as_str()) != current_project_id => Err(
                TransmissionError::Conflict(format!("project name already exists: {name}")),
            ),
            _ => Ok(()),
        }
    }
}

fn normalize_project_name(name: &str) -> Result<String, TransmissionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TransmissionError::Validation(
            "project name is required".to_string(),
        ));
    }
    if name.chars().count() > PROJECT_NAME_MAX {
        return Err(TransmissionError::Validation(format!(
            "project name must be at most {PROJECT_NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

fn project_not_found(project_id: &str) -> TransmissionError {
    TransmissionError::NotFound(format!("project not found: {project_id}"))
}

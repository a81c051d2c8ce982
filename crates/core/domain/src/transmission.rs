//! 传输相关枚举与设备传输状态机。

use serde::{Deserialize, Serialize};

/// 设备类型：Sensor 逐行发送，WebApp 一次发送整个数据集。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceType {
    Sensor,
    #[default]
    WebApp,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Sensor => "Sensor",
            DeviceType::WebApp => "WebApp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Sensor" => Some(DeviceType::Sensor),
            "WebApp" => Some(DeviceType::WebApp),
            _ => None,
        }
    }
}

/// 设备传输状态。
///
/// 对外仍以 `(transmission_enabled, transmission_paused)` 两个布尔值展示：
/// `Inactive=(false,false)`、`Manual=(true,false)`、`Active=(true,false)`、`Paused=(true,true)`。
/// `Manual` 与 `Active` 的区别在于自动调度是否已武装。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionState {
    #[default]
    Inactive,
    Manual,
    Active,
    Paused,
}

/// 作用于状态机的命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionCommand {
    Enable,
    Start,
    Pause,
    Resume,
    Stop,
    TransmitNow,
}

impl TransmissionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionCommand::Enable => "enable",
            TransmissionCommand::Start => "start",
            TransmissionCommand::Pause => "pause",
            TransmissionCommand::Resume => "resume",
            TransmissionCommand::Stop => "stop",
            TransmissionCommand::TransmitNow => "transmit_now",
        }
    }

    const ALL: [TransmissionCommand; 6] = [
        TransmissionCommand::Enable,
        TransmissionCommand::Start,
        TransmissionCommand::Pause,
        TransmissionCommand::Resume,
        TransmissionCommand::Stop,
        TransmissionCommand::TransmitNow,
    ];
}

/// 非法状态迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} while transmission is {}", .command.as_str(), .from.as_str())]
pub struct InvalidTransition {
    pub from: TransmissionState,
    pub command: TransmissionCommand,
}

impl TransmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionState::Inactive => "INACTIVE",
            TransmissionState::Manual => "MANUAL",
            TransmissionState::Active => "ACTIVE",
            TransmissionState::Paused => "PAUSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INACTIVE" => Some(TransmissionState::Inactive),
            "MANUAL" => Some(TransmissionState::Manual),
            "ACTIVE" => Some(TransmissionState::Active),
            "PAUSED" => Some(TransmissionState::Paused),
            _ => None,
        }
    }

    pub fn is_enabled(self) -> bool {
        !matches!(self, TransmissionState::Inactive)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, TransmissionState::Paused)
    }

    /// 自动调度是否应处于武装状态。
    pub fn is_armed(self) -> bool {
        matches!(self, TransmissionState::Active)
    }

    /// 迁移表。
    pub fn apply(self, command: TransmissionCommand) -> Result<Self, InvalidTransition> {
        use TransmissionCommand as C;
        use TransmissionState as S;
        let next = match (self, command) {
            (S::Inactive, C::Enable) => S::Manual,
            (state, C::Enable) => state,
            (_, C::Start) => S::Active,
            (S::Active | S::Paused, C::Pause) => S::Paused,
            (S::Paused, C::Resume) => S::Active,
            (_, C::Stop) => S::Inactive,
            (S::Active, C::TransmitNow) => {
                return Err(InvalidTransition {
                    from: self,
                    command,
                });
            }
            (state, C::TransmitNow) => state,
            (from, command) => return Err(InvalidTransition { from, command }),
        };
        Ok(next)
    }

    /// 当前状态下允许的命令。
    pub fn allowed_commands(self) -> Vec<TransmissionCommand> {
        TransmissionCommand::ALL
            .into_iter()
            .filter(|command| self.apply(*command).is_ok())
            .collect()
    }
}

/// 单次传输结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionStatus {
    Success,
    Failed,
}

impl TransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionStatus::Success => "SUCCESS",
            TransmissionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(TransmissionStatus::Success),
            "FAILED" => Some(TransmissionStatus::Failed),
            _ => None,
        }
    }
}

/// 传输触发方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionType {
    Manual,
    Automatic,
}

impl TransmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionType::Manual => "MANUAL",
            TransmissionType::Automatic => "AUTOMATIC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Some(TransmissionType::Manual),
            "AUTOMATIC" => Some(TransmissionType::Automatic),
            _ => None,
        }
    }
}

/// 项目整体传输状态（仅由批量编排推导）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectTransmissionStatus {
    #[default]
    Inactive,
    Active,
    Paused,
}

impl ProjectTransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectTransmissionStatus::Inactive => "INACTIVE",
            ProjectTransmissionStatus::Active => "ACTIVE",
            ProjectTransmissionStatus::Paused => "PAUSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INACTIVE" => Some(ProjectTransmissionStatus::Inactive),
            "ACTIVE" => Some(ProjectTransmissionStatus::Active),
            "PAUSED" => Some(ProjectTransmissionStatus::Paused),
            _ => None,
        }
    }
}

/// 项目批量操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOperation {
    Start,
    Pause,
    Resume,
    Stop,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Start => "START",
            BulkOperation::Pause => "PAUSE",
            BulkOperation::Resume => "RESUME",
            BulkOperation::Stop => "STOP",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "START" => Some(BulkOperation::Start),
            "PAUSE" => Some(BulkOperation::Pause),
            "RESUME" => Some(BulkOperation::Resume),
            "STOP" => Some(BulkOperation::Stop),
            _ => None,
        }
    }

    /// 成功后推导的项目状态；`None` 表示保持原状态。
    pub fn derived_status(&self, successful: usize) -> Option<ProjectTransmissionStatus> {
        match self {
            BulkOperation::Stop => Some(ProjectTransmissionStatus::Inactive),
            _ if successful == 0 => None,
            BulkOperation::Start | BulkOperation::Resume => Some(ProjectTransmissionStatus::Active),
            BulkOperation::Pause => Some(ProjectTransmissionStatus::Paused),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use TransmissionCommand as C;
        use TransmissionState as S;
        assert_eq!(S::Inactive.apply(C::Enable), Ok(S::Manual));
        assert_eq!(S::Manual.apply(C::Start), Ok(S::Active));
        assert_eq!(S::Active.apply(C::Pause), Ok(S::Paused));
        assert_eq!(S::Paused.apply(C::Pause), Ok(S::Paused));
        assert_eq!(S::Paused.apply(C::Resume), Ok(S::Active));
        assert!(S::Active.apply(C::Resume).is_err());
        assert!(S::Inactive.apply(C::Pause).is_err());
        assert!(S::Active.apply(C::TransmitNow).is_err());
        assert_eq!(S::Paused.apply(C::TransmitNow), Ok(S::Paused));
        for state in [S::Inactive, S::Manual, S::Active, S::Paused] {
            assert_eq!(state.apply(C::Stop), Ok(S::Inactive));
        }
    }

    #[test]
    fn wire_flags() {
        assert!(!TransmissionState::Inactive.is_enabled());
        assert!(TransmissionState::Manual.is_enabled());
        assert!(!TransmissionState::Manual.is_armed());
        assert!(TransmissionState::Paused.is_enabled() && TransmissionState::Paused.is_paused());
    }

    #[test]
    fn stop_always_resets_project_status() {
        assert_eq!(
            BulkOperation::Stop.derived_status(0),
            Some(ProjectTransmissionStatus::Inactive)
        );
        assert_eq!(BulkOperation::Start.derived_status(0), None);
        assert_eq!(
            BulkOperation::Pause.derived_status(2),
            Some(ProjectTransmissionStatus::Paused)
        );
    }
}

//! 内存存储实现模块
//!
//! 用于测试和无数据库的本地运行。
//!
//! 包含以下实现：
//! - DeviceStore: InMemoryDeviceStore
//! - ConnectionStore / ConnectionTestStore: InMemoryConnectionStore, InMemoryConnectionTestStore
//! - ProjectStore: InMemoryProjectStore
//! - TransmissionHistoryStore: InMemoryHistoryStore

pub mod connection;
pub mod device;
pub mod history;
pub mod project;

pub use connection::*;
pub use device::*;
pub use history::*;
pub use project::*;

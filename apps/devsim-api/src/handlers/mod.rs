//! Handlers 模块

pub mod connections;
pub mod devices;
pub mod health;
pub mod history;
pub mod projects;
pub mod transmissions;
pub mod uploads;

pub use connections::*;
pub use devices::*;
pub use health::*;
pub use history::*;
pub use projects::*;
pub use transmissions::*;
pub use uploads::*;

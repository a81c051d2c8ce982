//! 中间件模块

pub mod session;

pub use session::*;

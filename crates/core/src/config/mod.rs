//! 配置管理
//!
//! 配置由一个组合了具名子配置的 [`AppConfig`] 表示，加载顺序为默认值、TOML 文件、
//! `COORDINATOR__` 前缀的环境变量。

pub mod models;

pub use models::*;

//! Fulfillment Console Server - ベンダー向け出荷管理コンソール
//!
//! # 架构概述
//!
//! - **数据库** (`db`): SQLite 存储 + 任务队列 (Job Store)
//! - **Shopify 客户端** (`shopify`): 履约 API 调用与重试
//! - **履约服务** (`fulfillment`): 对账 (reconciliation) 与出荷登録
//! - **任务执行** (`jobs`): 导入任务的认领、切片处理、后台扫描
//! - **HTTP API** (`api`): 入队、轮询、扫描接口
//!
//! # 模块结构
//!
//! ```text
//! console-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # 数据库层 (连接池、仓储)
//! ├── shopify/       # 外部履约 API 客户端
//! ├── fulfillment/   # 对账 + 出荷登録服务
//! ├── jobs/          # 导入任务执行器与后台工作者
//! └── utils/         # 错误、日志等工具
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod fulfillment;
pub mod jobs;
pub mod shopify;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
   ______                       __
  / ____/___  ____  _________  / /__
 / /   / __ \/ __ \/ ___/ __ \/ / _ \
/ /___/ /_/ / / / (__  ) /_/ / /  __/
\____/\____/_/ /_/____/\____/_/\___/
    "#
    );
}

//! 服务器状态 - 持有所有服务的单例引用
//!
//! 所有服务在启动时构造一次，通过 `ServerState` 以 Arc 引用传递；
//! 不存在模块级/全局缓存的客户端实例。

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::core::Config;
use crate::db::DbService;
use crate::fulfillment::FulfillmentService;
use crate::jobs::runner::{ImportJobRunner, SweepLimits};
use crate::shopify::ShopifyFulfillmentClient;

/// 服务器状态
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | db | SQLite 连接池 |
/// | shopify | Shopify 履约 API 客户端 |
/// | fulfillment | 对账 + 出荷登録服务 |
/// | runner | 导入任务执行器 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: SqlitePool,
    pub shopify: Arc<ShopifyFulfillmentClient>,
    pub fulfillment: Arc<FulfillmentService>,
    pub runner: Arc<ImportJobRunner>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：工作目录 → 数据库 → Shopify 客户端 → 服务。
    ///
    /// # Panics
    ///
    /// 数据库初始化失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        config
            .ensure_work_dir_structure()
            .expect("Failed to create work directory structure");

        let db_path = config.database_dir().join("console.db");
        let db_service = DbService::new(&db_path.to_string_lossy())
            .await
            .expect("Failed to initialize database");

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        let shopify = Arc::new(ShopifyFulfillmentClient::new(http));

        Self::with_services(config.clone(), db_service.pool, shopify)
    }

    /// 用已构造的依赖装配状态（测试场景注入 mock 客户端）
    pub fn with_services(
        config: Config,
        db: SqlitePool,
        shopify: Arc<ShopifyFulfillmentClient>,
    ) -> Self {
        let fulfillment = Arc::new(FulfillmentService::new(db.clone(), shopify.clone()));
        let runner = Arc::new(ImportJobRunner::new(
            db.clone(),
            fulfillment.clone(),
            config.import_stale_after_secs,
        ));

        Self {
            config,
            db,
            shopify,
            fulfillment,
            runner,
        }
    }

    /// 后台扫描的批量上限
    pub fn sweep_limits(&self) -> SweepLimits {
        SweepLimits::clamped(self.config.import_job_limit, self.config.import_item_limit)
    }
}

use std::path::PathBuf;

use crate::db::repository::import_job;

/// 服务器配置 - 履约控制台的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/fulfillment/console | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | IMPORT_JOB_LIMIT | 5 | 每次扫描认领的任务数 (clamp [1,5]) |
/// | IMPORT_ITEM_LIMIT | 50 | 每个切片处理的条目数 (clamp [1,100]) |
/// | IMPORT_STALE_AFTER_SECS | 90 | 锁过期阈值 (clamp [30,3600]) |
/// | SWEEP_INTERVAL_SECS | 60 | 后台扫描间隔 |
/// | SYNC_RETRY_BATCH | 20 | 每次扫描重试的延迟同步出荷数 |
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 出荷インポート設定 ===
    /// 每次后台扫描认领的任务数上限
    pub import_job_limit: i64,
    /// 每个处理切片加载的条目数上限
    pub import_item_limit: i64,
    /// 认领锁的过期阈值（秒）
    pub import_stale_after_secs: i64,
    /// 后台扫描间隔（秒）
    pub sweep_interval_secs: u64,
    /// 每次扫描重试的延迟同步出荷数
    pub sync_retry_batch: i64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值；数值项在加载时夹紧到允许范围。
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR")
                .unwrap_or_else(|_| "/var/lib/fulfillment/console".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            import_job_limit: std::env::var("IMPORT_JOB_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(import_job::MAX_CLAIM_LIMIT)
                .clamp(1, import_job::MAX_CLAIM_LIMIT),
            import_item_limit: std::env::var("IMPORT_ITEM_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50)
                .clamp(1, 100),
            import_stale_after_secs: import_job::clamp_stale_secs(
                std::env::var("IMPORT_STALE_AFTER_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(import_job::DEFAULT_STALE_AFTER_SECS),
            ),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            sync_retry_batch: std::env::var("SYNC_RETRY_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20)
                .clamp(1, 100),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 数据库目录
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(PathBuf::from(&self.work_dir).join("logs"))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped_at_load() {
        // SAFETY: tests in this module are the only writers of these vars
        unsafe {
            std::env::set_var("IMPORT_JOB_LIMIT", "50");
            std::env::set_var("IMPORT_ITEM_LIMIT", "5000");
            std::env::set_var("IMPORT_STALE_AFTER_SECS", "1");
        }
        let config = Config::from_env();
        assert_eq!(config.import_job_limit, 5);
        assert_eq!(config.import_item_limit, 100);
        assert_eq!(config.import_stale_after_secs, 30);
        unsafe {
            std::env::remove_var("IMPORT_JOB_LIMIT");
            std::env::remove_var("IMPORT_ITEM_LIMIT");
            std::env::remove_var("IMPORT_STALE_AFTER_SECS");
        }
    }
}

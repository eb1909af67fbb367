use std::sync::Arc;

use crate::db::Database;
use crate::pipeline::Pipeline;
use crate::storage::StorageDir;

/// 应用状态
pub struct AppState {
    /// 数据库连接
    pub db: Database,
    /// 检测编排器
    pub pipeline: Pipeline,
    /// 文件存储
    pub storage: StorageDir,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: Database, pipeline: Pipeline, storage: StorageDir) -> Arc<Self> {
        Arc::new(AppState { db, pipeline, storage })
    }
}

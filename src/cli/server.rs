use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::{DetectOptions, Opts};
use crate::pipeline::Pipeline;
use crate::storage::StorageDir;
use crate::{db, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub detect: DetectOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        std::fs::create_dir_all(opts.data_dir.path())?;
        let pool = db::init_db(opts.data_dir.database()).await?;
        let storage = StorageDir::create(opts.data_dir.path())?;
        let pipeline = Pipeline::from_options(&self.detect, &opts.data_dir, storage.clone())?;

        // 创建应用状态
        let state = server::AppState::new(pool, pipeline, storage);

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

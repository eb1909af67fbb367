use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static DATA_DIR: LazyLock<DataDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "civiscan").expect("failed to get project dir");
    DataDir { path: proj_dirs.data_dir().to_path_buf() }
});

fn default_data_dir() -> &'static str {
    DATA_DIR.path().to_str().unwrap()
}

/// 检测相关的配置项
#[derive(Parser, Debug, Clone)]
pub struct DetectOptions {
    /// 坑洞检测模型（ONNX）路径，默认为数据目录下的 models/pothole.onnx
    #[arg(long, value_name = "PATH")]
    pub pothole_model: Option<PathBuf>,
    /// 垃圾检测模型（ONNX）路径，默认为数据目录下的 models/waste.onnx
    #[arg(long, value_name = "PATH")]
    pub waste_model: Option<PathBuf>,
    /// 垃圾模型标签文件，每行一个类别名，用于启动时校验类别映射
    #[arg(long, value_name = "PATH")]
    pub waste_labels: Option<PathBuf>,
    /// 置信度阈值
    #[arg(long, value_name = "CONF", default_value_t = 0.5)]
    pub confidence: f32,
    /// NMS 的 IoU 阈值
    #[arg(long, value_name = "IOU", default_value_t = 0.45)]
    pub iou: f32,
    /// 模型输入边长
    #[arg(long, value_name = "N", default_value_t = 640)]
    pub input_size: i32,
    /// 检测器优先级顺序，命中即停
    #[arg(long, value_enum, default_value_t = DetectOrder::PotholeFirst)]
    pub order: DetectOrder,
}

impl DetectOptions {
    pub fn pothole_model(&self, dir: &DataDir) -> PathBuf {
        self.pothole_model.clone().unwrap_or_else(|| dir.models().join("pothole.onnx"))
    }

    pub fn waste_model(&self, dir: &DataDir) -> PathBuf {
        self.waste_model.clone().unwrap_or_else(|| dir.models().join("waste.onnx"))
    }

    pub fn waste_labels(&self, dir: &DataDir) -> Option<PathBuf> {
        Some(self.waste_labels.clone().unwrap_or_else(|| dir.models().join("waste.labels")))
    }
}

/// 两个检测器之间的优先级是部署期配置，不在运行时推断
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOrder {
    /// 先检测坑洞，未命中再检测垃圾
    PotholeFirst,
    /// 先检测垃圾，未命中再检测坑洞
    WasteFirst,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "civiscan", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// civiscan 数据目录，存放数据库、模型和图片
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: DataDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 检测服务
    Server(ServerCommand),
    /// 对本地图片做一次检测，结果输出到终端
    Detect(DetectCommand),
}

/// 数据目录及其内部路径约定
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("civiscan.db")
    }

    /// 返回模型目录的路径
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::classify::{self, DetectKind, WasteClass};
use crate::config::{DataDir, DetectOptions, DetectOrder};
use crate::detector::{Detection, ObjectDetector, YoloDetector};
use crate::storage::{FileRole, StagedFile, StorageDir};

/// 检测器槽位
///
/// 模型加载失败不会让进程退出，而是把槽位标记为不可用，
/// 编排时跳过它
pub enum DetectorSlot {
    Ready { kind: DetectKind, detector: Box<dyn ObjectDetector> },
    Unavailable { kind: DetectKind, reason: String },
}

impl DetectorSlot {
    pub fn kind(&self) -> DetectKind {
        match self {
            Self::Ready { kind, .. } | Self::Unavailable { kind, .. } => *kind,
        }
    }
}

/// 一次检测请求的最终结果
///
/// 命中的变体里保存的是已经移入永久存储的文件名
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Pothole {
        status: String,
        image_name: String,
        detected_image_path: Option<String>,
    },
    Waste {
        class: WasteClass,
        detection_status: String,
        image_name: String,
        detected_image_path: Option<String>,
    },
    /// 所有检测器都没有检出目标
    NoDetection,
    /// 所有检测器都不可用，和"没有检出目标"区分开
    Unserviceable,
}

/// 检测编排器：按优先级依次调用检测器，命中即停
pub struct Pipeline {
    slots: Vec<DetectorSlot>,
    storage: StorageDir,
    confidence: f32,
}

impl Pipeline {
    pub fn new(slots: Vec<DetectorSlot>, storage: StorageDir, confidence: f32) -> Self {
        Self { slots, storage, confidence }
    }

    /// 按配置加载两个模型并组装编排器
    pub fn from_options(opts: &DetectOptions, dir: &DataDir, storage: StorageDir) -> Result<Self> {
        let pothole = load_slot(
            DetectKind::Pothole,
            &opts.pothole_model(dir),
            None,
            opts.input_size,
            opts.iou,
        );
        let waste = load_slot(
            DetectKind::Waste,
            &opts.waste_model(dir),
            opts.waste_labels(dir).as_deref(),
            opts.input_size,
            opts.iou,
        );
        let slots = match opts.order {
            DetectOrder::PotholeFirst => vec![pothole, waste],
            DetectOrder::WasteFirst => vec![waste, pothole],
        };
        Ok(Self::new(slots, storage, opts.confidence))
    }

    pub fn slots(&self) -> &[DetectorSlot] {
        &self.slots
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// 处理一个已经暂存的上传
    ///
    /// 命中时原图和标注图被移入永久存储；没有命中时临时文件被丢弃。
    /// 检测器本身报错时请求失败，临时文件原地保留以便人工恢复
    pub fn process(&self, staged: StagedFile) -> Result<Outcome> {
        let mut available = 0;
        for slot in &self.slots {
            let (kind, detector) = match slot {
                DetectorSlot::Ready { kind, detector } => (*kind, detector.as_ref()),
                DetectorSlot::Unavailable { kind, reason } => {
                    warn!("跳过不可用的 {} 检测器: {reason}", kind.as_str());
                    continue;
                }
            };
            available += 1;
            let detections = detector.detect(staged.path(), self.confidence)?;
            if detections.is_empty() {
                continue;
            }
            info!("{} 检测器命中 {} 个目标", kind.as_str(), detections.len());
            return self.matched(kind, detector, &detections, staged);
        }

        staged.discard()?;
        match available {
            0 => Ok(Outcome::Unserviceable),
            _ => Ok(Outcome::NoDetection),
        }
    }

    /// 命中后的收尾：渲染标注图，把两个文件移入永久存储
    fn matched(
        &self,
        kind: DetectKind,
        detector: &dyn ObjectDetector,
        detections: &[Detection],
        staged: StagedFile,
    ) -> Result<Outcome> {
        // 渲染失败不阻塞主流程，记录里的标注图路径留空
        let annotated = self.storage.reserve(staged.name());
        let annotated = match detector.annotate(staged.path(), detections, annotated.path()) {
            Ok(()) => Some(annotated),
            Err(e) => {
                warn!("渲染标注图失败: {e:#}");
                None
            }
        };

        // 先原图后标注图，全部成功后调用方才会写数据库
        let image_name = staged.promote(&self.storage, kind, FileRole::Original)?;
        let detected_image_path = match annotated {
            Some(file) => Some(file.promote(&self.storage, kind, FileRole::Detected)?),
            None => None,
        };

        match kind {
            DetectKind::Pothole => Ok(Outcome::Pothole {
                status: "Pothole detected".to_string(),
                image_name,
                detected_image_path,
            }),
            DetectKind::Waste => {
                // 分类取检测器自身排名最高的第一个框
                let class = classify::resolve(detections[0].class_id);
                Ok(Outcome::Waste {
                    detection_status: format!("{} detected", class.category.as_str()),
                    class,
                    image_name,
                    detected_image_path,
                })
            }
        }
    }
}

/// 加载一个模型槽位，失败时降级为 Unavailable
fn load_slot(
    kind: DetectKind,
    model: &Path,
    labels: Option<&Path>,
    input_size: i32,
    iou: f32,
) -> DetectorSlot {
    let result = load_labels(kind, labels)
        .and_then(|labels| YoloDetector::load(model, labels, input_size, iou));
    match result {
        Ok(detector) => DetectorSlot::Ready { kind, detector: Box::new(detector) },
        Err(e) => {
            warn!("{} 检测器不可用: {e:#}", kind.as_str());
            DetectorSlot::Unavailable { kind, reason: format!("{e:#}") }
        }
    }
}

/// 读取标签文件；垃圾模型的标签要和分类映射表核对
fn load_labels(kind: DetectKind, path: Option<&Path>) -> Result<Option<Vec<String>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let labels: Vec<String> = fs::read_to_string(path)
        .with_context(|| format!("读取标签文件失败: {}", path.display()))?
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if kind == DetectKind::Waste {
        classify::validate_labels(&labels)
            .with_context(|| format!("标签文件 {} 和分类映射表不一致", path.display()))?;
    }
    Ok(Some(labels))
}

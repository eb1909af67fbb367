use std::path::PathBuf;

use clap::Parser;
use serde_json::json;

use crate::classify::{self, DetectKind};
use crate::cli::SubCommandExtend;
use crate::config::{DetectOptions, Opts};
use crate::pipeline::{DetectorSlot, Pipeline};
use crate::storage::StorageDir;

#[derive(Parser, Debug, Clone)]
pub struct DetectCommand {
    #[command(flatten)]
    pub detect: DetectOptions,
    /// 待检测的图片路径
    pub image: PathBuf,
}

impl SubCommandExtend for DetectCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let storage = StorageDir::create(opts.data_dir.path())?;
        let pipeline = Pipeline::from_options(&self.detect, &opts.data_dir, storage)?;

        for slot in pipeline.slots() {
            match slot {
                DetectorSlot::Ready { kind, detector } => {
                    let detections = detector.detect(&self.image, pipeline.confidence())?;
                    let boxes = detections
                        .iter()
                        .map(|d| {
                            let mut value = json!({
                                "class_id": d.class_id,
                                "confidence": d.confidence,
                                "box": [d.rect.x, d.rect.y, d.rect.width, d.rect.height],
                            });
                            if *kind == DetectKind::Waste {
                                let class = classify::resolve(d.class_id);
                                value["category"] = json!(class.category.as_str());
                            }
                            value
                        })
                        .collect::<Vec<_>>();
                    let result = json!({ "kind": kind.as_str(), "detections": boxes });
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    // 和服务端行为保持一致：命中即停
                    if !detections.is_empty() {
                        break;
                    }
                }
                DetectorSlot::Unavailable { kind, reason } => {
                    eprintln!("[SKIP] {}: {}", kind.as_str(), reason);
                }
            }
        }
        Ok(())
    }
}

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, ensure};
use log::{debug, info};
use opencv::core::{self, Mat, Point, Rect, Scalar, Size, Vector};
use opencv::prelude::*;
use opencv::{dnn, imgcodecs, imgproc};

/// 单个检测框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: i32,
    pub confidence: f32,
    pub rect: Rect,
}

/// 目标检测器抽象
///
/// 编排层只依赖这个 trait，测试里用假实现替换真实模型
pub trait ObjectDetector: Send + Sync {
    /// 对图片运行推理，返回按置信度降序排列的检测框，可能为空
    ///
    /// 不得修改输入文件
    fn detect(&self, image: &Path, confidence: f32) -> Result<Vec<Detection>>;

    /// 把检测框画在原图副本上并写入 out
    fn annotate(&self, image: &Path, detections: &[Detection], out: &Path) -> Result<()>;
}

/// 基于 OpenCV DNN 的 YOLO(ONNX) 检测器
///
/// 模型进程内只加载一次；Net::forward 需要 &mut，
/// 用互斥锁把同一模型上的推理串行化
pub struct YoloDetector {
    net: Mutex<dnn::Net>,
    labels: Option<Vec<String>>,
    input_size: i32,
    iou: f32,
}

impl YoloDetector {
    /// 加载 ONNX 模型
    pub fn load(
        model: &Path,
        labels: Option<Vec<String>>,
        input_size: i32,
        iou: f32,
    ) -> Result<Self> {
        let net = dnn::read_net_from_onnx(model.to_str().context("模型路径不是合法 UTF-8")?)
            .with_context(|| format!("加载模型失败: {}", model.display()))?;
        info!("模型加载完成: {}", model.display());
        Ok(Self { net: Mutex::new(net), labels, input_size, iou })
    }

    fn forward(&self, img: &Mat) -> Result<Mat> {
        let blob = dnn::blob_from_image(
            img,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;
        let mut net = self.net.lock().expect("detector mutex poisoned");
        net.set_input(&blob, "", 1.0, Scalar::default())?;
        let names = net.get_unconnected_out_layers_names()?;
        let mut outputs: Vector<Mat> = Vector::new();
        net.forward(&mut outputs, &names)?;
        Ok(outputs.get(0)?)
    }

    /// 解码 YOLOv8 风格的输出，形状为 [1, 4+nc, N]
    ///
    /// 前 4 个通道为中心点坐标和宽高，其余为各类别得分
    fn decode(&self, output: &Mat, size: Size, confidence: f32) -> Result<Vec<Detection>> {
        let dims = output.mat_size();
        ensure!(dims.len() == 3, "模型输出维度异常: {:?}", &*dims);
        let channels = dims[1];
        let anchors = dims[2];

        let sx = size.width as f32 / self.input_size as f32;
        let sy = size.height as f32 / self.input_size as f32;

        let mut rects: Vector<Rect> = Vector::new();
        let mut scores: Vector<f32> = Vector::new();
        let mut classes = vec![];
        for i in 0..anchors {
            let mut best = 0.0f32;
            let mut best_class = -1;
            for c in 4..channels {
                let score = *output.at_3d::<f32>(0, c, i)?;
                if score > best {
                    best = score;
                    best_class = c - 4;
                }
            }
            if best < confidence {
                continue;
            }
            let cx = *output.at_3d::<f32>(0, 0, i)?;
            let cy = *output.at_3d::<f32>(0, 1, i)?;
            let w = *output.at_3d::<f32>(0, 2, i)?;
            let h = *output.at_3d::<f32>(0, 3, i)?;
            rects.push(Rect::new(
                ((cx - w / 2.0) * sx) as i32,
                ((cy - h / 2.0) * sy) as i32,
                (w * sx) as i32,
                (h * sy) as i32,
            ));
            scores.push(best);
            classes.push(best_class);
        }

        let mut keep: Vector<i32> = Vector::new();
        dnn::nms_boxes(&rects, &scores, confidence, self.iou, &mut keep, 1.0, 0)?;

        let mut result = Vec::with_capacity(keep.len());
        for idx in keep.iter() {
            let idx = idx as usize;
            result.push(Detection {
                class_id: classes[idx],
                confidence: scores.get(idx)?,
                rect: rects.get(idx)?,
            });
        }
        result.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!("检出 {} 个目标", result.len());
        Ok(result)
    }

    fn label(&self, class_id: i32) -> String {
        self.labels
            .as_ref()
            .and_then(|l| usize::try_from(class_id).ok().and_then(|i| l.get(i)))
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

// Net 内部是堆指针，配合互斥锁可以安全地跨线程共享
unsafe impl Send for YoloDetector {}
unsafe impl Sync for YoloDetector {}

impl ObjectDetector for YoloDetector {
    fn detect(&self, image: &Path, confidence: f32) -> Result<Vec<Detection>> {
        let img = imread(image)?;
        let output = self.forward(&img)?;
        self.decode(&output, img.size()?, confidence)
    }

    fn annotate(&self, image: &Path, detections: &[Detection], out: &Path) -> Result<()> {
        let mut img = imread(image)?;
        let color = Scalar::new(0.0, 255.0, 0.0, 0.0);
        for det in detections {
            imgproc::rectangle(&mut img, det.rect, color, 2, imgproc::LINE_8, 0)?;
            let label = format!("{} {:.2}", self.label(det.class_id), det.confidence);
            imgproc::put_text(
                &mut img,
                &label,
                Point::new(det.rect.x, det.rect.y - 4),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                color,
                1,
                imgproc::LINE_8,
                false,
            )?;
        }
        let flags: Vector<i32> = Vector::new();
        imgcodecs::imwrite(out.to_str().context("输出路径不是合法 UTF-8")?, &img, &flags)?;
        Ok(())
    }
}

fn imread(path: &Path) -> Result<Mat> {
    let img = imgcodecs::imread(
        path.to_str().context("图片路径不是合法 UTF-8")?,
        imgcodecs::IMREAD_COLOR,
    )?;
    ensure!(!img.empty(), "无法读取图片: {}", path.display());
    Ok(img)
}

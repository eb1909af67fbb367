use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::FromRow;

/// 数据库里的时间戳统一用这个格式对外序列化
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 坑洞记录
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PotholeRecord {
    pub id: i64,
    /// 原图在 storage/pothole/original/ 下的文件名
    pub image_name: String,
    /// 标注图在 storage/pothole/detected/ 下的文件名，渲染失败时为空
    pub detected_image_path: Option<String>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 创建时间，入库后不再变化
    pub created_at: NaiveDateTime,
    pub status: String,
}

impl PotholeRecord {
    /// 序列化为响应 JSON，附带图片访问地址
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "image_name": self.image_name,
            "detected_image_path": self.detected_image_path,
            "location": self.location,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "timestamp": self.created_at.format(TIME_FORMAT).to_string(),
            "status": self.status,
            "original_image_url": format!("/storage/pothole/original/{}", self.image_name),
            "detected_image_url": self
                .detected_image_path
                .as_ref()
                .map(|p| format!("/storage/pothole/detected/{p}")),
        })
    }
}

/// 垃圾记录
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WasteRecord {
    pub id: i64,
    /// 原图在 storage/waste/original/ 下的文件名
    pub image_name: String,
    /// 标注图在 storage/waste/detected/ 下的文件名，渲染失败时为空
    pub detected_image_path: Option<String>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 创建时间，入库后不再变化
    pub created_at: NaiveDateTime,
    pub detection_status: String,
    pub is_waste: bool,
    pub waste_category: String,
    pub is_recyclable: bool,
    pub is_decomposable: bool,
}

impl WasteRecord {
    /// 序列化为响应 JSON，附带图片访问地址
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "image_name": self.image_name,
            "detected_image_path": self.detected_image_path,
            "location": self.location,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "timestamp": self.created_at.format(TIME_FORMAT).to_string(),
            "detection_status": self.detection_status,
            "is_waste": self.is_waste,
            "waste_category": self.waste_category,
            "is_recyclable": self.is_recyclable,
            "is_decomposable": self.is_decomposable,
            "original_image_url": format!("/storage/waste/original/{}", self.image_name),
            "detected_image_url": self
                .detected_image_path
                .as_ref()
                .map(|p| format!("/storage/waste/detected/{p}")),
        })
    }
}

/// 待入库的坑洞记录
#[derive(Debug, Clone)]
pub struct NewPothole {
    pub image_name: String,
    pub detected_image_path: Option<String>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
}

/// 待入库的垃圾记录
#[derive(Debug, Clone)]
pub struct NewWaste {
    pub image_name: String,
    pub detected_image_path: Option<String>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub detection_status: String,
    pub waste_category: String,
    pub is_recyclable: bool,
    pub is_decomposable: bool,
}

/// 部分更新请求，缺省的字段保持原值
///
/// 图片路径和创建时间不可变更；status 只对坑洞生效，
/// detection_status 及分类字段只对垃圾生效
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionUpdate {
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
    pub detection_status: Option<String>,
    pub waste_category: Option<String>,
    pub is_recyclable: Option<bool>,
    pub is_decomposable: Option<bool>,
}

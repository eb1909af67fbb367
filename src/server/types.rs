use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use utoipa::ToSchema;

/// 检测上传请求
#[derive(TryFromMultipart)]
pub struct DetectionRequest {
    pub image: FieldData<Bytes>,
    pub latitude: String,
    pub longitude: String,
    pub location: String,
}

/// 检测上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct DetectionForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
    /// 纬度，十进制小数
    pub latitude: String,
    /// 经度，十进制小数
    pub longitude: String,
    /// 位置描述
    pub location: String,
}

/// 部分更新表单（用于API文档）
///
/// 缺省字段保持原值；status 只对坑洞生效，
/// detection_status 及分类字段只对垃圾生效
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UpdateForm {
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
    pub detection_status: Option<String>,
    pub waste_category: Option<String>,
    pub is_recyclable: Option<bool>,
    pub is_decomposable: Option<bool>,
}

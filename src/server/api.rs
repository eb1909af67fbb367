use std::sync::Arc;

use anyhow::anyhow;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use log::info;
use serde_json::{Value, json};
use tokio::task::block_in_place;

use super::error::{ApiError, Result};
use super::state::AppState;
use super::types::*;
use crate::classify::DetectKind;
use crate::db::{DetectionUpdate, NewPothole, NewWaste, crud};
use crate::pipeline::Outcome;

fn parse_kind(kind: &str) -> Result<DetectKind> {
    kind.parse::<DetectKind>().map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_coord(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {value:?}")))
}

/// 上传待检测的图片
#[utoipa::path(
    post,
    path = "/api/detections",
    request_body(content = DetectionForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "检出目标并建档"),
        (status = 200, description = "未检出目标"),
        (status = 400, description = "请求字段缺失或非法"),
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<DetectionRequest>,
) -> Result<Response> {
    // 先校验所有字段再落盘，被拒绝的请求不留任何临时文件
    let latitude = parse_coord("latitude", &data.latitude)?;
    let longitude = parse_coord("longitude", &data.longitude)?;
    let location = data.location.trim().to_string();
    if location.is_empty() {
        return Err(ApiError::BadRequest("location must not be empty".to_string()));
    }
    let file_name = data
        .image
        .metadata
        .file_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("image file name must not be empty".to_string()))?;
    if data.image.contents.is_empty() {
        return Err(ApiError::BadRequest("image must not be empty".to_string()));
    }

    info!("处理上传图片: {file_name}");

    // 推理是同步阻塞的，放到阻塞上下文里执行
    let outcome = block_in_place(|| {
        let staged = state.storage.stage(&data.image.contents, &file_name)?;
        state.pipeline.process(staged)
    })?;

    let (status, body) = match outcome {
        Outcome::Pothole { status, image_name, detected_image_path } => {
            let new = NewPothole { image_name, detected_image_path, location, latitude, longitude, status };
            let record = crud::insert_pothole(&state.db, &new).await?;
            (
                StatusCode::CREATED,
                json!({
                    "message": "image uploaded, processed and saved successfully",
                    "kind": DetectKind::Pothole,
                    "data": record.to_json(),
                }),
            )
        }
        Outcome::Waste { class, detection_status, image_name, detected_image_path } => {
            let new = NewWaste {
                image_name,
                detected_image_path,
                location,
                latitude,
                longitude,
                detection_status,
                waste_category: class.category.as_str().to_string(),
                is_recyclable: class.is_recyclable,
                is_decomposable: class.is_decomposable,
            };
            let record = crud::insert_waste(&state.db, &new).await?;
            (
                StatusCode::CREATED,
                json!({
                    "message": "image uploaded, processed and saved successfully",
                    "kind": DetectKind::Waste,
                    "data": record.to_json(),
                }),
            )
        }
        Outcome::NoDetection => (StatusCode::OK, json!({ "message": "no detection found" })),
        Outcome::Unserviceable => {
            return Err(ApiError::Internal(anyhow!("no detector available")));
        }
    };

    Ok((status, Json(body)).into_response())
}

/// 列出某一类的全部记录
#[utoipa::path(
    get,
    path = "/api/detections/{kind}",
    params(("kind" = String, Path, description = "检测类别，pothole 或 waste")),
    responses(
        (status = 200, description = "记录列表"),
        (status = 400, description = "未知检测类别"),
    )
)]
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Value>> {
    let records = match parse_kind(&kind)? {
        DetectKind::Pothole => {
            crud::list_pothole(&state.db).await?.iter().map(|r| r.to_json()).collect::<Vec<_>>()
        }
        DetectKind::Waste => {
            crud::list_waste(&state.db).await?.iter().map(|r| r.to_json()).collect::<Vec<_>>()
        }
    };
    Ok(Json(json!({ "data": records })))
}

/// 按 ID 查询单条记录
#[utoipa::path(
    get,
    path = "/api/detections/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "检测类别，pothole 或 waste"),
        ("id" = i64, Path, description = "记录 ID"),
    ),
    responses(
        (status = 200, description = "记录内容"),
        (status = 404, description = "记录不存在"),
    )
)]
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Value>> {
    let record = match parse_kind(&kind)? {
        DetectKind::Pothole => crud::get_pothole(&state.db, id).await?.map(|r| r.to_json()),
        DetectKind::Waste => crud::get_waste(&state.db, id).await?.map(|r| r.to_json()),
    };
    match record {
        Some(record) => Ok(Json(json!({ "data": record }))),
        None => Err(ApiError::NotFound("record not found".to_string())),
    }
}

/// 部分更新一条记录
#[utoipa::path(
    put,
    path = "/api/detections/{kind}/{id}",
    request_body = UpdateForm,
    params(
        ("kind" = String, Path, description = "检测类别，pothole 或 waste"),
        ("id" = i64, Path, description = "记录 ID"),
    ),
    responses(
        (status = 200, description = "更新后的记录"),
        (status = 404, description = "记录不存在"),
    )
)]
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i64)>,
    Json(update): Json<DetectionUpdate>,
) -> Result<Json<Value>> {
    let record = match parse_kind(&kind)? {
        DetectKind::Pothole => {
            crud::update_pothole(&state.db, id, &update).await?.map(|r| r.to_json())
        }
        DetectKind::Waste => crud::update_waste(&state.db, id, &update).await?.map(|r| r.to_json()),
    };
    match record {
        Some(record) => {
            Ok(Json(json!({ "message": "record updated successfully", "data": record })))
        }
        None => Err(ApiError::NotFound("record not found".to_string())),
    }
}

/// 删除一条记录并回收它引用的图片文件
#[utoipa::path(
    delete,
    path = "/api/detections/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "检测类别，pothole 或 waste"),
        ("id" = i64, Path, description = "记录 ID"),
    ),
    responses(
        (status = 200, description = "删除成功"),
        (status = 404, description = "记录不存在"),
    )
)]
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Value>> {
    let kind = parse_kind(&kind)?;
    // 先删行再回收文件，文件缺失不会让删除失败
    let files = match kind {
        DetectKind::Pothole => crud::delete_pothole(&state.db, id)
            .await?
            .map(|r| (r.image_name, r.detected_image_path)),
        DetectKind::Waste => crud::delete_waste(&state.db, id)
            .await?
            .map(|r| (r.image_name, r.detected_image_path)),
    };
    match files {
        Some((image_name, detected_image_path)) => {
            state.storage.reclaim(kind, &image_name, detected_image_path.as_deref());
            Ok(Json(json!({ "message": "record deleted successfully" })))
        }
        None => Err(ApiError::NotFound("record not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Bytes;
    use axum_typed_multipart::{FieldData, FieldMetadata};
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    use super::*;
    use crate::pipeline::Pipeline;
    use crate::storage::StorageDir;

    async fn test_state(storage: StorageDir) -> Arc<AppState> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&db).await.unwrap();
        AppState::new(db, Pipeline::new(vec![], storage.clone(), 0.5), storage)
    }

    fn request(latitude: &str) -> TypedMultipart<DetectionRequest> {
        TypedMultipart(DetectionRequest {
            image: FieldData {
                metadata: FieldMetadata {
                    file_name: Some("road.jpg".to_string()),
                    ..Default::default()
                },
                contents: Bytes::from_static(b"jpeg bytes"),
            },
            latitude: latitude.to_string(),
            longitude: "85.3".to_string(),
            location: "Main St".to_string(),
        })
    }

    // 字段校验发生在任何文件落盘之前，被拒绝的上传不留临时文件
    #[tokio::test]
    async fn test_rejected_upload_leaves_no_temp() {
        let root = tempdir().unwrap();
        let storage = StorageDir::create(root.path()).unwrap();
        let state = test_state(storage.clone()).await;

        let result = upload_handler(State(state), request("abc")).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(std::fs::read_dir(storage.tmp_dir()).unwrap().count(), 0);
    }

    // 经纬度在任何文件落盘之前校验，非法值直接拒绝
    #[test]
    fn test_parse_coord() {
        assert_eq!(parse_coord("latitude", "27.7").unwrap(), 27.7);
        assert_eq!(parse_coord("latitude", " -85.3 ").unwrap(), -85.3);
        assert!(matches!(parse_coord("latitude", "abc"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_coord("longitude", ""), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("pothole").unwrap(), DetectKind::Pothole);
        assert_eq!(parse_kind("waste").unwrap(), DetectKind::Waste);
        assert!(matches!(parse_kind("unknown"), Err(ApiError::BadRequest(_))));
    }
}

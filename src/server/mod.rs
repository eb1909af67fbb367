mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::upload_handler,
        api::list_handler,
        api::get_handler,
        api::update_handler,
        api::delete_handler,
    ),
    components(schemas(types::DetectionForm, types::UpdateForm,),)
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let storage_dir = state.storage.storage_dir();
    Router::new()
        .route("/api/detections", post(api::upload_handler))
        .route("/api/detections/{kind}", get(api::list_handler))
        .route(
            "/api/detections/{kind}/{id}",
            get(api::get_handler).put(api::update_handler).delete(api::delete_handler),
        )
        // 图片按记录里保存的相对路径只读回读
        .nest_service("/storage", ServeDir::new(storage_dir))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}

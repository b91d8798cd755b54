use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::job::{JobInput, JobType, RagIngestInput};
use crate::models::product::{NewProduct, ProductMetadata};
use crate::models::requests::{ProductListResponse, ProductUploadResponse, QUEUED};
use crate::routes::UploadLimit;
use crate::services::dispatch;
use crate::services::storage::safe_file_name;

/// GET /api/products: the caller's products, newest first.
pub async fn list_products(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ProductListResponse>> {
    let products = state.store.list_products(user.id).await?;
    let total = products.len();
    Ok(Json(ProductListResponse { products, total }))
}

struct UploadedFile {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

/// POST /api/products/upload: store a document and queue its ingestion.
///
/// Multipart fields: `file` (required), `name`, `description`.
pub async fn upload_product(
    user: AuthUser,
    State(state): State<AppState>,
    Extension(UploadLimit(max_bytes)): Extension<UploadLimit>,
    mut multipart: Multipart,
) -> AppResult<Json<ProductUploadResponse>> {
    let mut file: Option<UploadedFile> = None;
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = safe_file_name(field.file_name().unwrap_or_default());
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                if data.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File exceeds the {max_bytes} byte upload limit"
                    )));
                }
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            Some("name") => name = Some(field.text().await?),
            Some("description") => description = Some(field.text().await?),
            _ => {}
        }
    }

    let file = file
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    let product = NewProduct {
        id: Uuid::new_v4(),
        name: name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| file.filename.clone()),
        description: description.unwrap_or_default(),
        source_file: file.filename.clone(),
        metadata: ProductMetadata {
            size: file.data.len() as u64,
            content_type: file.content_type.clone(),
        },
    };

    let path = state
        .artifacts
        .save_upload(user.id, product.id, &file.filename, &file.data)
        .await?;

    let job_id = Uuid::new_v4();
    let input = JobInput::RagIngest(RagIngestInput {
        product_id: product.id,
        filename: file.filename.clone(),
        file_path: path.to_string_lossy().into_owned(),
    });

    let submitted = match state
        .store
        .submit_product(user.id, &product, job_id, &input)
        .await
    {
        Ok(submitted) => submitted,
        Err(e) => {
            state.artifacts.discard(&path).await;
            return Err(e.into());
        }
    };
    metrics::counter!("jobs_submitted_total", "type" => JobType::RagIngest.to_string()).increment(1);

    tracing::info!(
        job_id = %submitted.job_id,
        product_id = %product.id,
        user_id = %user.id,
        filename = %file.filename,
        size = file.data.len(),
        "Product upload queued for ingestion"
    );

    dispatch::deliver_or_defer(&state, submitted.job_id, JobType::RagIngest.queue()).await;

    Ok(Json(ProductUploadResponse {
        status: QUEUED.to_string(),
        product_id: product.id,
        job_id: submitted.job_id,
        message: "Product upload queued for processing".to_string(),
    }))
}

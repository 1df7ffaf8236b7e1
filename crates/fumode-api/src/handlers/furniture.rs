//! Furniture image uploads

use crate::validation::ValidationErrors;
use crate::{ApiError, AppState};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fumode_core::{TransferError, TransferItem};
use fumode_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct UploadedImages {
    pub banner_url: String,
    pub image_urls: Vec<String>,
}

struct UploadForm {
    banner: Option<TransferItem>,
    images: Vec<TransferItem>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        banner: None,
        images: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name != "banner" && field_name != "images" {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let item = TransferItem::new(file_name, content_type, data);
        if field_name == "banner" {
            form.banner = Some(item);
        } else {
            form.images.push(item);
        }
    }

    Ok(form)
}

/// Delete already stored objects after a failed request
fn schedule_cleanup(state: &AppState, keys: Vec<String>) {
    if keys.is_empty() {
        return;
    }
    warn!(objects = keys.len(), "removing uploads of a failed request");

    let store: Arc<dyn ObjectStore> = Arc::clone(&state.store);
    state.runner.submit("orphan-cleanup", async move {
        for key in keys {
            store.delete_object(&key).await?;
        }
        Ok::<_, anyhow::Error>(())
    });
}

/// POST /v1/furniture/images
///
/// Multipart form with one `banner` file and one or more `images` files.
pub async fn upload_furniture_images(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_upload_form(multipart).await?;

    let mut v = ValidationErrors::new();
    v.check(form.banner.is_some(), "banner", "must be a valid file");
    v.check(!form.images.is_empty(), "images", "must contain at least one image");
    v.into_result()?;
    let (Some(banner), images) = (form.banner, form.images) else {
        return Err(ApiError::internal("banner missing after validation"));
    };

    let banner = state
        .transfers
        .transfer_one(banner)
        .await
        .map_err(|err| ApiError::upload("banner", err))?;

    let deadline = state.config.bulk_deadline();
    let images = match tokio::time::timeout(deadline, state.transfers.transfer_all(images)).await {
        Ok(Ok(images)) => images,
        Ok(Err(err)) => {
            let mut orphans = vec![banner.key];
            if let TransferError::Aggregate(aggregate) = &err {
                orphans.extend(aggregate.succeeded.iter().map(|result| result.object.key.clone()));
            }
            schedule_cleanup(&state, orphans);
            return Err(err.into());
        }
        Err(_) => {
            // Item tasks still in flight keep running and are not cleaned up.
            schedule_cleanup(&state, vec![banner.key]);
            return Err(ApiError::DeadlineExceeded {
                seconds: deadline.as_secs(),
            });
        }
    };

    info!(images = images.len(), "furniture images uploaded");

    let body = UploadedImages {
        banner_url: banner.locator,
        image_urls: images.into_iter().map(|result| result.object.locator).collect(),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

use super::repo;

/// Presigned image URLs stay valid long enough for a client render cycle.
const IMAGE_URL_TTL_SECS: u64 = 30 * 60;

pub struct SniffedImage {
    pub ext: &'static str,
    pub content_type: &'static str,
}

/// Identify an image payload by its magic bytes. Anything unrecognized is not
/// a well-formed image as far as this API is concerned.
pub fn sniff_image(bytes: &[u8]) -> Option<SniffedImage> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SniffedImage {
            ext: "jpg",
            content_type: "image/jpeg",
        });
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(SniffedImage {
            ext: "png",
            content_type: "image/png",
        });
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(SniffedImage {
            ext: "gif",
            content_type: "image/gif",
        });
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(SniffedImage {
            ext: "webp",
            content_type: "image/webp",
        });
    }
    None
}

/// Object key for a recipe image: fresh UUID plus the upload's extension.
pub fn image_key(ext: &str) -> String {
    format!("uploads/recipe/{}.{}", Uuid::new_v4(), ext)
}

/// Validate, store, and link an uploaded recipe image, returning a presigned
/// URL for the stored object. The superseded object, if any, is deleted once
/// the row points at the new key.
pub async fn store_recipe_image(
    state: &AppState,
    user_id: Uuid,
    recipe_id: i64,
    original_ext: Option<&str>,
    body: Bytes,
) -> Result<String, ApiError> {
    let sniffed =
        sniff_image(&body).ok_or_else(|| ApiError::validation("image", "upload a valid image"))?;

    let previous_key = repo::get_recipe(&state.db, user_id, recipe_id)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?
        .image_key;

    let ext = original_ext.unwrap_or(sniffed.ext);
    let key = image_key(ext);
    state
        .storage
        .put_object(&key, body, sniffed.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    // The row update is the commit point; losing the race to a concurrent
    // delete only leaves an unreferenced object behind.
    if repo::set_image_key(&state.db, user_id, recipe_id, &key)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("recipe"));
    }

    if let Some(old_key) = previous_key {
        if old_key != key {
            if let Err(e) = state.storage.delete_object(&old_key).await {
                warn!(error = %e, key = %old_key, "failed to delete replaced image");
            }
        }
    }

    let url = state
        .storage
        .presign_get(&key, IMAGE_URL_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    #[test]
    fn sniffs_known_image_formats() {
        assert_eq!(sniff_image(JPEG).unwrap().ext, "jpg");
        assert_eq!(sniff_image(PNG).unwrap().ext, "png");
        assert_eq!(sniff_image(b"GIF89a-rest-of-file").unwrap().ext, "gif");

        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0x10, 0x00, 0x00, 0x00]);
        webp.extend_from_slice(b"WEBPVP8 ");
        assert_eq!(sniff_image(&webp).unwrap().ext, "webp");
    }

    #[test]
    fn rejects_non_image_payloads() {
        assert!(sniff_image(b"not an image").is_none());
        assert!(sniff_image(b"").is_none());
        assert!(sniff_image(b"RIFF1234WAVE").is_none());
        assert!(sniff_image(&[0xFF, 0xD8]).is_none());
    }

    #[test]
    fn image_keys_are_unique_and_carry_the_extension() {
        let a = image_key("jpg");
        let b = image_key("jpg");
        assert_ne!(a, b);
        assert!(a.starts_with("uploads/recipe/"));
        assert!(a.ends_with(".jpg"));
    }
}

//! Request handlers module

use axum::http::HeaderValue;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::routes::ApiResponse;

pub mod auth;
pub mod dashboard;
pub mod file;
pub mod folder;
pub mod notification;
pub mod trash;
pub mod user;

/// JSON envelope result shared by the API handlers
pub type ApiResult<T> = AppResult<Json<ApiResponse<T>>>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// `Content-Disposition` value carrying a UTF-8 file name
pub fn attachment(file_name: &str) -> HeaderValue {
    let mut encoded = String::with_capacity(file_name.len());
    for b in file_name.bytes() {
        if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{:02X}", b));
        }
    }
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_header() {
        let v = attachment("rapport été.pdf");
        assert_eq!(
            v.to_str().unwrap(),
            "attachment; filename=\"rapport__t_.pdf\"; filename*=UTF-8''rapport%20%C3%A9t%C3%A9.pdf"
        );
    }
}

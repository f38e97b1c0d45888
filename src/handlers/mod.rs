pub mod files;
pub mod projects;
pub mod sections;

use axum::{
    body::Body,
    extract::multipart::MultipartError,
    http::{StatusCode, header},
    response::Response,
};
use tracing::error;

use crate::error::AppError;

pub async fn health_check() -> &'static str {
    "OK"
}

/// Map a multipart read failure, keeping the body-limit case distinct.
pub(crate) fn multipart_error(err: MultipartError) -> AppError {
    error!("Error parsing multipart: {}", err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(err.body_text());
    }
    AppError::Multipart(format!("Failed to parse multipart form: {}", err))
}

/// Binary response that the browser saves as `filename`.
pub(crate) fn attachment(content: impl Into<Body>, filename: &str, content_type: &str) -> Response {
    let mut response = Response::new(content.into());

    // Set Content-Type header so the browser knows the file type
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream")),
    );

    // Header values must be visible ASCII; anything else becomes `_`
    let ascii_name: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        header::HeaderValue::from_str(&format!("attachment; filename=\"{}\"", ascii_name))
            .unwrap_or_else(|_| header::HeaderValue::from_static("attachment")),
    );

    response
}

/// Zip archive download.
pub(crate) fn zip_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    attachment(bytes, filename, "application/zip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_names_are_ascii_safe() {
        let response = attachment(Vec::new(), "Schaltplan \"ü\".pdf", "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Schaltplan ___.pdf\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    }
}

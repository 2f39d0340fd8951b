//! Image reference normalization.
//!
//! Renderers see one representation regardless of provider: either a URL
//! or a `data:` URI.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ProviderError, ProviderResult};

/// Wrap a base64 image payload as a data URI, rejecting corrupt payloads.
pub fn data_uri(mime_type: &str, b64: &str) -> ProviderResult<String> {
    let payload: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(ProviderError::invalid_response("empty image payload"));
    }
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ProviderError::invalid_response(format!("bad base64 image: {}", e)))?;

    Ok(format!("data:{};base64,{}", mime_type, payload))
}

pub fn is_data_uri(image_ref: &str) -> bool {
    image_ref.starts_with("data:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri() {
        let uri = data_uri("image/png", "aGVsbG8=").unwrap();
        assert_eq!(uri, "data:image/png;base64,aGVsbG8=");
        assert!(is_data_uri(&uri));
    }

    #[test]
    fn test_rejects_corrupt_payload() {
        assert!(data_uri("image/png", "not base64!!").is_err());
        assert!(data_uri("image/png", "").is_err());
    }

    #[test]
    fn test_strips_line_breaks() {
        let uri = data_uri("image/png", "aGVs\nbG8=").unwrap();
        assert_eq!(uri, "data:image/png;base64,aGVsbG8=");
    }
}

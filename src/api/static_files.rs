use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets"]
pub struct Assets;

/// Serve a file bundled into the binary, such as the browser loader script
pub async fn serve_static(uri: Uri) -> Response {
    serve_embedded(uri.path().trim_start_matches('/'))
}

fn serve_embedded(path: &str) -> Response {
    match Assets::get(path) {
        Some(content) => {
            let mime = from_path(path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
                ],
                content.data,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_script_is_embedded() {
        let script = Assets::get("ad-server.js").expect("loader script embedded");
        let source = std::str::from_utf8(&script.data).unwrap();
        assert!(source.contains("ad_server_jsonp_page_data"));
    }

    #[test]
    fn test_unknown_asset_is_404() {
        let response = serve_embedded("missing.js");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

use axum::response::IntoResponse;

// axum handler for the root banner
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::root;
    use axum::{body::to_bytes, response::IntoResponse};

    #[tokio::test]
    async fn root_returns_name_and_version() {
        let response = root().await.into_response();
        let bytes = to_bytes(response.into_body(), 1024)
            .await
            .expect("body should be readable");
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.starts_with("vetrina"));
    }
}

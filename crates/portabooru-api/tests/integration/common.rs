//! Shared test helpers for Danbooru API integration tests
//!
//! Each helper mounts the endpoints a test needs on a wiremock server and
//! returns clients pointed at it.

use std::sync::Arc;

use portabooru_api::client::BooruClient;
use portabooru_api::provider::DanbooruProvider;
use portabooru_core::domain::Credentials;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LOGIN: &str = "test-user";
pub const API_KEY: &str = "test-api-key";

pub fn credentials() -> Credentials {
    Credentials::new(LOGIN, API_KEY).expect("valid test credentials")
}

/// Starts a mock server and returns a provider with the given page size
pub async fn setup_provider(page_size: u32) -> (MockServer, DanbooruProvider) {
    let server = MockServer::start().await;
    let client = Arc::new(BooruClient::with_base_url(credentials(), server.uri()));
    let provider = DanbooruProvider::new(client, page_size);
    (server, provider)
}

/// JSON for a listable post with an asset served by `server`
pub fn post_json(server: &MockServer, id: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "md5": format!("md5-{id}"),
        "file_url": format!("{}/data/{id}.png", server.uri()),
        "file_ext": "png",
        "rating": "g",
        "tag_string": "arknights solo",
        "updated_at": "2024-05-01T10:00:00.000-04:00"
    })
}

/// Mounts one listing page for `tag` at cursor value `page`
pub async fn mount_page(server: &MockServer, tag: &str, page: &str, posts: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("tags", tag))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts))
        .mount(server)
        .await;
}

/// Mounts an asset body at `/data/{id}.png`
pub async fn mount_asset(server: &MockServer, id: u64, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/data/{id}.png")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "image/png"),
        )
        .mount(server)
        .await;
}

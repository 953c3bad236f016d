//! Integration tests for the listing port
//!
//! - Query parameters (tags, limit, page cursor)
//! - Tag lookup through the catalogue
//! - Port-level error classification

use portabooru_core::domain::{PostId, Tag};
use portabooru_core::ports::{IPostListing, PageCursor, RemoteError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_first_page_uses_page_one() {
    let (server, provider) = common::setup_provider(2).await;

    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("tags", "furina_(genshin_impact)"))
        .and(query_param("limit", "2"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            common::post_json(&server, 30),
            common::post_json(&server, 20),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let tag = Tag::new("furina_(genshin_impact)").unwrap();
    let posts = provider
        .fetch_page(&tag, PageCursor::First)
        .await
        .expect("page should load");

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, PostId::new(30));
    assert_eq!(posts[1].id, PostId::new(20));
    assert!(posts[0].has_asset());
}

#[tokio::test]
async fn test_following_page_uses_before_cursor() {
    let (server, provider) = common::setup_provider(200).await;
    common::mount_page(
        &server,
        "arknights",
        "b20",
        serde_json::json!([common::post_json(&server, 10)]),
    )
    .await;

    let tag = Tag::new("arknights").unwrap();
    let posts = provider
        .fetch_page(&tag, PageCursor::Before(PostId::new(20)))
        .await
        .unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, PostId::new(10));
}

#[tokio::test]
async fn test_multi_tag_query_is_encoded() {
    let (server, provider) = common::setup_provider(200).await;
    common::mount_page(&server, "arknights rating:g", "1", serde_json::json!([])).await;

    let tag = Tag::new("arknights rating:g").unwrap();
    let posts = provider.fetch_page(&tag, PageCursor::First).await.unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_resolve_known_tag() {
    let (server, provider) = common::setup_provider(200).await;
    Mock::given(method("GET"))
        .and(path("/tags.json"))
        .and(query_param("search[name]", "arknights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "name": "arknights", "post_count": 123456}
        ])))
        .mount(&server)
        .await;

    let count = provider
        .resolve_tag(&Tag::new("arknights").unwrap())
        .await
        .unwrap();
    assert_eq!(count, Some(123456));
}

#[tokio::test]
async fn test_resolve_unknown_tag() {
    let (server, provider) = common::setup_provider(200).await;
    Mock::given(method("GET"))
        .and(path("/tags.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let count = provider
        .resolve_tag(&Tag::new("definitely_not_a_tag").unwrap())
        .await
        .unwrap();
    assert_eq!(count, None);
}

#[tokio::test]
async fn test_listing_errors_map_to_remote_errors() {
    let (server, provider) = common::setup_provider(200).await;
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("tags", "broken"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("tags", "a b c"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "success": false,
            "message": "You cannot search for more than 2 tags at a time"
        })))
        .mount(&server)
        .await;

    let err = provider
        .fetch_page(&Tag::new("broken").unwrap(), PageCursor::First)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 502, .. }));
    assert!(err.is_transient());

    let err = provider
        .fetch_page(&Tag::new("a b c").unwrap(), PageCursor::First)
        .await
        .unwrap_err();
    match err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("more than 2 tags"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

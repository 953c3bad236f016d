//! Integration tests for asset downloads

use portabooru_core::domain::AssetRef;
use portabooru_core::ports::{IAssetFetcher, RemoteError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_fetch_asset_returns_body() {
    let (server, provider) = common::setup_provider(200).await;
    let content = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3];
    common::mount_asset(&server, 77, &content).await;

    let asset = AssetRef {
        url: format!("{}/data/77.png", server.uri()),
        extension: "png".into(),
    };
    let body = provider.fetch_asset(&asset).await.expect("download");
    assert_eq!(body, content);
}

#[tokio::test]
async fn test_fetch_large_asset() {
    let (server, provider) = common::setup_provider(200).await;
    let content: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
    common::mount_asset(&server, 78, &content).await;

    let asset = AssetRef {
        url: format!("{}/data/78.png", server.uri()),
        extension: "png".into(),
    };
    let body = provider.fetch_asset(&asset).await.unwrap();
    assert_eq!(body.len(), content.len());
    assert_eq!(body, content);
}

#[tokio::test]
async fn test_missing_asset_is_permanent() {
    let (server, provider) = common::setup_provider(200).await;
    Mock::given(method("GET"))
        .and(path("/data/404.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let asset = AssetRef {
        url: format!("{}/data/404.png", server.uri()),
        extension: "png".into(),
    };
    let err = provider.fetch_asset(&asset).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { status: 404, .. }));
    assert!(!err.is_transient());
}

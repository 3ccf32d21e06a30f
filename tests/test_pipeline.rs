use brocade::catalog::Catalog;
use brocade::classify::{UpstreamErrorKind, UpstreamResponse, classify};
use brocade::config::setup_logging;
use brocade::error::ApiError;
use brocade::prompt::PromptBuilder;

#[test]
fn flower_prompt_then_warming_response() {
    let _ = setup_logging(true);

    let prompt = PromptBuilder::default().build("岩墙花");
    assert!(prompt.as_str().starts_with("traditional Tujia brocade"));
    assert!(prompt.as_str().contains("vertical runner"));
    assert!(!prompt.as_str().contains("based on concept"));

    let response = classify(br#"{"error": "Model is currently loading"}"#.to_vec());
    let UpstreamResponse::Error { message, kind } = response else {
        panic!("expected an upstream error");
    };
    assert_eq!(kind, UpstreamErrorKind::Warming);
    assert_eq!(
        ApiError::from_upstream(message, kind).to_string(),
        "模型正在唤醒中，请等待 20 秒后再次点击生成..."
    );
}

#[test]
fn bird_prompt_is_the_totem() {
    let prompt = PromptBuilder::default().build("一只阳雀");
    assert!(prompt.as_str().contains("Abstract geometric bird totem"));
    assert!(!prompt.as_str().contains("Rock Wall Flower"));
}

#[test]
fn binary_body_is_an_image() {
    let body = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    assert_eq!(classify(body.clone()), UpstreamResponse::Image(body));
}

#[tokio::test]
async fn bundled_catalog_needs_files_on_disk() {
    let catalog = Catalog::bundled().expect("bundled catalog");
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(catalog.search(dir.path(), None).await.is_empty());

    let first = &catalog.entries()[0];
    std::fs::write(dir.path().join(&first.filename), b"jpg").expect("write");
    let found = catalog.search(dir.path(), Some("FLOWER")).await;
    assert_eq!(found, vec![first]);
}

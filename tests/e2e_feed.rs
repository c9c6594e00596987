//! E2E tests for the Atom article feed

mod common;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::{TestServer, png_bytes};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn fetch_feed(server: &TestServer, consumer_id: &str) -> reqwest::Response {
    server
        .client
        .get(server.url(&format!("/article/atom/{consumer_id}")))
        .send()
        .await
        .unwrap()
}

fn entry_ids(xml: &str) -> Vec<String> {
    xml.split("<entry>")
        .skip(1)
        .filter_map(|entry| {
            let start = entry.find("<id>")? + "<id>".len();
            let end = entry.find("</id>")?;
            Some(entry[start..end].to_string())
        })
        .collect()
}

#[tokio::test]
async fn test_unknown_consumer_is_not_found() {
    let server = TestServer::new().await;

    let response = fetch_feed(&server, "01HZZZZZZZZZZZZZZZZZZZZZZZ").await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_feed_headers_and_envelope() {
    let server = TestServer::new().await;
    let consumer = server.create_consumer("Intranet", &["staff"]).await;

    let response = fetch_feed(&server, &consumer.id).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/atom+xml; charset=utf-8"
    );

    let xml = response.text().await.unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#));
    assert!(xml.contains("<title>Article</title>"));
    assert!(xml.contains("<subtitle>University news</subtitle>"));
    assert!(xml.contains(r#"<link rel="alternate" href="https://www.example.org/"/>"#));
    assert!(xml.contains(&format!(
        r#"<link rel="self" href="https://feeds.test.example.com/article/atom/{}"/>"#,
        consumer.id
    )));
    assert!(entry_ids(&xml).is_empty());
}

#[tokio::test]
async fn test_feed_filters_by_role_and_publication() {
    let server = TestServer::new().await;
    server.publish_article(1, "2024-01-01T00:00:00Z", &["staff"]).await;
    server.publish_article(2, "2024-01-02T00:00:00Z", &["student"]).await;
    server.publish_article(3, "2024-01-03T00:00:00Z", &["student", "staff"]).await;
    // Created but never published
    server
        .send_article_event("entry.create", json!({"id": 4, "roles": ["staff"]}))
        .await;

    let consumer = server.create_consumer("Staff portal", &["staff"]).await;
    let xml = fetch_feed(&server, &consumer.id).await.text().await.unwrap();

    assert_eq!(entry_ids(&xml), vec!["3", "1"]);
}

#[tokio::test]
async fn test_feed_is_ordered_and_truncated() {
    let server = TestServer::with_config(|config| {
        config.feed.article.items = 3;
    })
    .await;
    for day in 1..=5 {
        server
            .publish_article(day, &format!("2024-02-0{day}T08:00:00Z"), &["staff"])
            .await;
    }

    let consumer = server.create_consumer("Staff portal", &["staff"]).await;
    let xml = fetch_feed(&server, &consumer.id).await.text().await.unwrap();

    assert_eq!(entry_ids(&xml), vec!["5", "4", "3"]);
}

#[tokio::test]
async fn test_consumer_without_roles_gets_empty_feed() {
    let server = TestServer::new().await;
    server.publish_article(1, "2024-01-01T00:00:00Z", &["staff"]).await;

    let consumer = server.create_consumer("Nobody", &[]).await;
    let xml = fetch_feed(&server, &consumer.id).await.text().await.unwrap();

    assert!(entry_ids(&xml).is_empty());
}

#[tokio::test]
async fn test_entry_content() {
    let server = TestServer::new().await;
    server
        .send_article_event(
            "entry.publish",
            json!({
                "id": 11,
                "title": "<b>Campus</b> &amp; City",
                "description": r#"<p style="color: red">See <a href="/events">events</a></p>"#,
                "publishedAt": "2024-04-01T09:30:00Z",
                "updatedAt": "2024-04-02T10:00:00Z",
                "roles": ["staff"],
            }),
        )
        .await;

    let consumer = server.create_consumer("Staff portal", &["staff"]).await;
    let xml = fetch_feed(&server, &consumer.id).await.text().await.unwrap();

    assert!(xml.contains("<title>Campus &amp; City</title>"));
    assert!(xml.contains("<published>2024-04-01T09:30:00Z</published>"));
    assert!(xml.contains("<updated>2024-04-02T10:00:00Z</updated>"));
    assert!(xml.contains("<rights>Example University</rights>"));
    assert!(xml.contains(r#"<summary type="html">"#));
    assert!(!xml.contains("color: red"));
    assert!(xml.contains("https://www.example.org/events"));

    let expected_id = STANDARD.encode(r#"{"id": 11, "type": "STRAPI", "localize": true}"#);
    let expected_link = url::Url::parse_with_params(
        "https://app.example.org/article",
        &[("id", expected_id.as_str())],
    )
    .unwrap();
    assert!(xml.contains(&format!(
        r#"<link rel="alternate" href="{}"/>"#,
        expected_link.as_str().replace('&', "&amp;")
    )));
}

#[tokio::test]
async fn test_enclosure_only_when_image_resolves() {
    let server = TestServer::new().await;

    Mock::given(method("GET"))
        .and(path("/uploads/campus.png"))
        .and(header("Authorization", "Bearer cms-media"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(png_bytes(8, 6)),
        )
        .mount(&server.image_host)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server.image_host)
        .await;

    server
        .send_article_event(
            "entry.publish",
            json!({
                "id": 21,
                "publishedAt": "2024-05-02T00:00:00Z",
                "roles": ["staff"],
                "image": {"url": "/uploads/campus.png"},
            }),
        )
        .await;
    server
        .send_article_event(
            "entry.publish",
            json!({
                "id": 22,
                "publishedAt": "2024-05-01T00:00:00Z",
                "roles": ["staff"],
                "image": "/uploads/missing.png",
            }),
        )
        .await;

    let consumer = server.create_consumer("Staff portal", &["staff"]).await;
    let xml = fetch_feed(&server, &consumer.id).await.text().await.unwrap();

    assert!(xml.contains(
        r#"<link rel="enclosure" href="https://feeds.test.example.com/image/article/21" type="image/webp"/>"#
    ));
    assert!(!xml.contains("/image/article/22"));
}

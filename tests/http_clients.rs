// tests/http_clients.rs
//
// HTTP collaborators exercised against a local axum server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use slavic_news_relay::classify::zero_shot::{HfZeroShotClassifier, TopicClassifier};
use slavic_news_relay::error::{ClassificationError, DeliveryError, FetchError};
use slavic_news_relay::ingest::providers::rss::RssFeed;
use slavic_news_relay::notify::discord::DiscordWebhook;
use slavic_news_relay::notify::{DeliveryMessage, DeliverySink};
use slavic_news_relay::translate::{self, LibreTranslate, MyMemory, TranslationStrategy, TranslatorChain};
use slavic_news_relay::FeedSource;

type Captured = Arc<Mutex<Vec<Value>>>;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn message() -> DeliveryMessage {
    DeliveryMessage {
        title: "Prezydent podpisał ustawę".into(),
        topic: "polityka krajowa".into(),
        source: "Polska – RMF24".into(),
        link: "https://www.rmf24.pl/a1".into(),
        untranslated: false,
    }
}

#[tokio::test]
async fn discord_webhook_posts_content_once() {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/hook",
            post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                c.lock().push(body);
                StatusCode::NO_CONTENT
            }),
        )
        .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .with_state(captured.clone());
    let base = spawn(app).await;

    let ok = DiscordWebhook::new(format!("{base}/hook")).with_timeout(5);
    ok.deliver(&message()).await.unwrap();
    {
        let bodies = captured.lock();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], json!({ "content": message().render() }));
    }

    let broken = DiscordWebhook::new(format!("{base}/broken")).with_timeout(5);
    let err = broken.deliver(&message()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(500)));
    // one-shot: no retry reached the capture route
    assert_eq!(captured.lock().len(), 1);

    let unset = DiscordWebhook::new(String::new());
    assert!(matches!(
        unset.deliver(&message()).await,
        Err(DeliveryError::NotConfigured)
    ));
}

#[tokio::test]
async fn libretranslate_then_mymemory_fallback() {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/lt/translate",
            post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                c.lock().push(body);
                Json(json!({ "translatedText": "The president signed the bill" }))
            }),
        )
        .route("/down/translate", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/mm",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let text = format!("[{}] {}", q["langpair"], q["q"]);
                Json(json!({ "responseData": { "translatedText": text }, "responseStatus": 200 }))
            }),
        )
        .with_state(captured.clone());
    let base = spawn(app).await;
    let client = translate::http_client(Duration::from_secs(5)).unwrap();

    let lt = LibreTranslate::new(&format!("{base}/lt"), None, client.clone());
    let out = lt.translate("Prezydent podpisał ustawę", "en").await.unwrap();
    assert_eq!(out, "The president signed the bill");
    assert_eq!(
        captured.lock()[0],
        json!({ "q": "Prezydent podpisał ustawę", "source": "auto", "target": "en", "format": "text" })
    );

    let chain = TranslatorChain::new(vec![
        Arc::new(LibreTranslate::new(&format!("{base}/down"), None, client.clone())),
        Arc::new(MyMemory::with_url(&format!("{base}/mm"), client)),
    ]);
    let t = chain.translate("Wojna", "en").await;
    assert!(!t.failed);
    assert_eq!(t.provider.as_deref(), Some("mymemory"));
    assert_eq!(t.text, "[Autodetect|en] Wojna");
}

#[tokio::test]
async fn mymemory_quota_answer_is_a_failure() {
    let app = Router::new().route(
        "/mm",
        get(|| async {
            Json(json!({
                "responseData": { "translatedText": "MYMEMORY WARNING: YOU USED ALL AVAILABLE FREE TRANSLATIONS" },
                "responseStatus": "429"
            }))
        }),
    );
    let base = spawn(app).await;
    let client = translate::http_client(Duration::from_secs(5)).unwrap();
    let mm = MyMemory::with_url(&format!("{base}/mm"), client);
    assert!(mm.translate("Wojna", "en").await.is_err());
}

#[tokio::test]
async fn zero_shot_client_sends_labels_and_token() {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/model",
            post(
                |State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    c.lock().push(json!({ "auth": auth, "body": body }));
                    Json(json!({
                        "sequence": "x",
                        "labels": ["domestic politics", "sports"],
                        "scores": [0.75, 0.25]
                    }))
                },
            ),
        )
        .route("/garbage", post(|| async { Json(json!({ "error": "loading" })) }))
        .route("/overloaded", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .with_state(captured.clone());
    let base = spawn(app).await;
    let labels = vec!["domestic politics".to_string(), "sports".to_string()];

    let clf = HfZeroShotClassifier::new(
        &format!("{base}/model"),
        Some("hf_secret".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    let ranked = clf.rank("The president signed the bill", &labels).await.unwrap();
    assert_eq!(ranked[0], ("domestic politics".to_string(), 0.75));

    let seen = captured.lock()[0].clone();
    assert_eq!(seen["auth"], "Bearer hf_secret");
    assert_eq!(seen["body"]["inputs"], "The president signed the bill");
    assert_eq!(seen["body"]["parameters"]["candidate_labels"], json!(labels));

    let garbage = HfZeroShotClassifier::new(&format!("{base}/garbage"), None, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        garbage.rank("x", &labels).await,
        Err(ClassificationError::Malformed(_))
    ));

    let overloaded = HfZeroShotClassifier::new(&format!("{base}/overloaded"), None, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        overloaded.rank("x", &labels).await,
        Err(ClassificationError::Status(503))
    ));
}

#[tokio::test]
async fn rss_feed_over_http() {
    let app = Router::new().route(
        "/feed",
        get(|| async { include_str!("fixtures/rmf24.xml") }),
    );
    let base = spawn(app).await;
    let client = RssFeed::http_client(Duration::from_secs(5)).unwrap();

    let feed = RssFeed::from_url("Polska – RMF24", format!("{base}/feed"), client.clone());
    let items = feed.fetch_latest().await.unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].title, "Prezydent podpisał ustawę");

    let missing = RssFeed::from_url("Polska – RMF24", format!("{base}/missing"), client);
    assert!(matches!(
        missing.fetch_latest().await,
        Err(FetchError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn rss_feed_honours_response_charset() {
    // "Prezydent podpisał ustawę" in windows-1250: ł = 0xB3, ę = 0xEA
    let mut body = b"<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>RMF24</title><item><title>Prezydent podpisa".to_vec();
    body.push(0xB3);
    body.extend_from_slice(b" ustaw");
    body.push(0xEA);
    body.extend_from_slice(b"</title><link>https://www.rmf24.pl/a1</link></item></channel></rss>");

    let app = Router::new().route(
        "/feed",
        get(move || {
            let body = body.clone();
            async move { ([(header::CONTENT_TYPE, "application/rss+xml; charset=windows-1250")], body) }
        }),
    );
    let base = spawn(app).await;
    let client = RssFeed::http_client(Duration::from_secs(5)).unwrap();

    let feed = RssFeed::from_url("Polska – RMF24", format!("{base}/feed"), client);
    let items = feed.fetch_latest().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Prezydent podpisał ustawę");
}

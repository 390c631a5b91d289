//! Both services over one workspace: a PDF uploaded through the admin
//! panel becomes citable in chat after a reindex and reload. The smoke
//! test is then run against the API over real HTTP.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{basic_auth, minimal_pdf_with_phrase, multipart_body, FakeChat, FakeProviders};
use docrag::admin_server::{admin_router, AdminState};
use docrag::api_server::api_router;
use docrag::auth::StaticCredentials;
use docrag::config::Config;
use docrag::reindex::ReindexSignal;
use docrag::rag::RagService;
use docrag::smoke::{smoke_test, CheckOutcome, SmokeOptions};
use docrag::store::DocumentStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "e2e-boundary";

#[tokio::test]
async fn upload_reindex_reload_chat() {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir)
        .await
        .unwrap();

    // API starts over an empty store
    let chat = FakeChat::new("Il lavoro remoto è consentito tre giorni a settimana.");
    let service = Arc::new(RagService::with_api_key(
        config.clone(),
        store.clone(),
        FakeProviders::new(chat.clone()),
        Some("test-key".to_string()),
    ));
    service.start().await;
    assert!(!service.snapshot().await.index_loaded());
    let api = api_router(service.clone());

    let admin = admin_router(AdminState::new(
        store.clone(),
        ReindexSignal::new(&config.paths.sentinel),
        Arc::new(StaticCredentials::new("admin", "pw")),
        None,
    ));

    // 1. upload
    let pdf = minimal_pdf_with_phrase("remote work policy allows three days");
    let response = admin
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(header::AUTHORIZATION, basic_auth("admin", "pw"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(BOUNDARY, &[("policy.pdf", pdf.as_slice())])))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(!store.list().await.unwrap()[0].indexed);

    // 2. reindex request
    let response = admin
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reindex")
                .header(header::AUTHORIZATION, basic_auth("admin", "pw"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(config.paths.sentinel.exists());

    // 3. reload
    let response = api
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!config.paths.sentinel.exists());
    assert!(store.list().await.unwrap()[0].indexed);

    // 4. chat
    let response = api
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "model": "rag-gemini",
                        "messages": [{ "role": "user", "content": "What does the remote work policy allow?" }]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("📚 **Fonti:**"));
    assert!(content.contains("policy.pdf"));

    let prompt = chat.last_prompt().unwrap();
    assert!(prompt.contains("remote work policy allows three days"));
}

#[tokio::test]
async fn smoke_test_against_live_api() {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir)
        .await
        .unwrap();
    store
        .save_upload("guida.md", "Guida rapida alla piattaforma.".as_bytes())
        .await
        .unwrap();

    let service = Arc::new(RagService::with_api_key(
        config,
        store,
        FakeProviders::new(FakeChat::new("ok")),
        Some("test-key".to_string()),
    ));
    service.start().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api_router(service)).await.unwrap();
    });

    let mut out = Vec::new();
    let report = smoke_test(
        &SmokeOptions {
            api_url: format!("http://{}", addr),
            reload: true,
        },
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(report.health, CheckOutcome::Passed);
    assert_eq!(report.documents, CheckOutcome::Passed);
    assert_eq!(report.reload, CheckOutcome::Passed);
    assert!(report.is_success());

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("1 file(s)"));
    assert!(printed.contains("guida.md"));
}

use axum::http::StatusCode;
use axum_test::TestServer;
use reviewbot::openai::ChatClient;
use reviewbot::prompt::FeedbackPreference;
use reviewbot::web_server::{build_router, ServerConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

fn config(templates_dir: PathBuf) -> ServerConfig {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    ServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        templates_dir,
        static_dir: root.join("static"),
    }
}

fn test_server() -> TestServer {
    let templates = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates");
    let app = build_router(
        &config(templates),
        ChatClient::with_base_url("http://127.0.0.1:9"),
    );
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_index_renders_form() {
    let server = test_server();
    let response = server.get("/").await;
    response.assert_status_ok();

    let html = response.text();
    assert!(html.contains("Book Review Feedback Bot"));
    assert!(html.contains("id=\"credential\""));
    assert!(html.contains("type=\"password\""));
    assert!(html.contains("id=\"book-title\""));
    assert!(html.contains("id=\"book-author\""));
    assert!(html.contains("id=\"chat-input\""));
    assert!(html.contains("https://platform.openai.com/account/api-keys"));
}

#[tokio::test]
async fn test_index_lists_every_preference_with_default_selected() {
    let server = test_server();
    let html = server.get("/").await.text();

    for preference in FeedbackPreference::ALL {
        assert!(
            html.contains(&format!("value=\"{}\"", preference.as_str())),
            "missing option for {}",
            preference
        );
    }
    assert!(html.contains("<option value=\"comprehensive\" selected>"));
}

#[tokio::test]
async fn test_index_shows_example_reviews() {
    let server = test_server();
    let html = server.get("/").await.text();
    assert!(html.contains("Watching the main character grow up was moving."));
    assert!(html.contains("The chapter on time management helped me most."));
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let server = test_server();
    let response = server.get("/static/app.js").await;
    response.assert_status_ok();
    assert!(response.text().contains("new WebSocket"));

    server.get("/static/style.css").await.assert_status_ok();
}

#[tokio::test]
async fn test_missing_template_is_a_server_error() {
    let app = build_router(
        &config(PathBuf::from("does-not-exist")),
        ChatClient::with_base_url("http://127.0.0.1:9"),
    );
    let server = TestServer::new(app).unwrap();
    let response = server.get("/").expect_failure().await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

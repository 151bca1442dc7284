use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    serve, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{context, path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::openai::{ChatClient, StreamEvent};
use crate::prompt::{BookMetadata, FeedbackPreference};
use crate::session::{ReviewSession, SessionError, SessionState, SessionView};

const PAGE_TITLE: &str = "Book Review Feedback Bot";
const API_KEY_URL: &str = "https://platform.openai.com/account/api-keys";

// Shown under the chat box while the transcript is empty.
const EXAMPLE_REVIEWS: [&str; 3] = [
    "I really enjoyed this book! Watching the main character grow up was moving.",
    "A thriller where I couldn't guess the culprit until the very end. What a twist!",
    "A self-help book full of practical advice. The chapter on time management helped me most.",
];

/// Frames the page script sends over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Credential {
        value: String,
    },
    Preferences {
        preference: FeedbackPreference,
        #[serde(default)]
        title: String,
        #[serde(default)]
        author: String,
    },
    Submit {
        text: String,
    },
    Reset,
}

/// Frames sent back to the page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full re-render payload, sent after every handled client frame.
    State { view: SessionView },
    /// The assistant reply is starting to stream.
    Started,
    Delta { text: String },
    Error { message: String, hint: Option<String> },
    Info { message: String },
}

pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

// Shared application state
#[derive(Clone)]
struct AppState {
    templates: Arc<AutoReloader>,
    chat_client: ChatClient,
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Edits to the form show up without a restart
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let preferences: Vec<_> = FeedbackPreference::ALL
        .iter()
        .map(|p| {
            context! {
                value => p.as_str(),
                label => p.label(),
                selected => *p == FeedbackPreference::default(),
            }
        })
        .collect();

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(context! {
                    title => PAGE_TITLE,
                    api_key_url => API_KEY_URL,
                    preferences => preferences,
                    example_reviews => EXAMPLE_REVIEWS,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// One WebSocket connection is one review session.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut session = ReviewSession::new();
    info!(session = %session.id(), "New session connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);

    // Writer runs separately so deltas reach the page while a reply is streaming.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        warn!("WebSocket client disconnected or send error. Closing connection.");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize server message: {}", e),
            }
        }
    });

    let _ = out_tx
        .send(ServerMessage::State {
            view: session.view(),
        })
        .await;

    // Frames are handled one at a time, so a session never has two requests in flight.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&mut session, &state.chat_client, msg, &out_tx).await,
                Err(e) => {
                    warn!("Ignoring malformed client frame: {}", e);
                    let _ = out_tx
                        .send(ServerMessage::Error {
                            message: format!("Malformed message: {}", e),
                            hint: None,
                        })
                        .await;
                }
            },
            Ok(Message::Binary(_)) => warn!("Received unexpected binary message from client"),
            Ok(Message::Close(_)) => {
                debug!("Client requested WebSocket close");
                break;
            }
            // Axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    drop(out_tx);
    let _ = writer.await;
    info!(session = %session.id(), "Session closed");
}

/// Applies one client frame to the session and queues the resulting frames on `out`.
///
/// Every call ends with a `State` frame so the page can re-render from scratch.
pub async fn handle_client_message(
    session: &mut ReviewSession,
    client: &ChatClient,
    msg: ClientMessage,
    out: &mpsc::Sender<ServerMessage>,
) {
    match msg {
        ClientMessage::Credential { value } => {
            if session.supply_credential(&value) == SessionState::AwaitingCredential {
                let _ = out
                    .send(ServerMessage::Info {
                        message: SessionError::MissingCredential.to_string(),
                    })
                    .await;
            }
        }
        ClientMessage::Preferences {
            preference,
            title,
            author,
        } => {
            session.set_preference(preference);
            session.set_book(BookMetadata::new(title, author));
        }
        ClientMessage::Submit { text } => {
            let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
            let forward = async {
                while let Some(event) = rx.recv().await {
                    let frame = match event {
                        StreamEvent::Start => ServerMessage::Started,
                        StreamEvent::Text(text) => ServerMessage::Delta { text },
                    };
                    let _ = out.send(frame).await;
                }
            };
            let (result, ()) = tokio::join!(session.submit(client, &text, tx), forward);

            match result {
                Ok(_) => {}
                Err(e @ (SessionError::MissingCredential | SessionError::EmptyMessage)) => {
                    let _ = out
                        .send(ServerMessage::Info {
                            message: e.to_string(),
                        })
                        .await;
                }
                Err(e) => {
                    let _ = out
                        .send(ServerMessage::Error {
                            message: e.to_string(),
                            hint: e.hint().map(str::to_string),
                        })
                        .await;
                }
            }
        }
        ClientMessage::Reset => session.reset(),
    }

    let _ = out
        .send(ServerMessage::State {
            view: session.view(),
        })
        .await;
}

/// Builds the application router: the form page, its WebSocket and static assets.
pub fn build_router(config: &ServerConfig, chat_client: ChatClient) -> Router {
    let state = AppState {
        templates: Arc::new(create_minijinja_env(config.templates_dir.clone())),
        chat_client,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(config: ServerConfig, chat_client: ChatClient) -> Result<()> {
    info!(api = %chat_client.base_url(), "Using chat completion API");
    let app = build_router(&config, chat_client);

    let addr = SocketAddr::new(config.host, config.port);
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI, image streaming and the real-time WebSocket channel

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use minijinja::{context, Environment};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeFile, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::LocalImageCache;
use crate::config::AppConfig;
use crate::location::{Location, LocationStore};
use crate::notifier::{ClientEvent, Notifier};
use crate::{BucketwatchError, Result};

const INDEX_TEMPLATE: &str = include_str!("templates/index.html");

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub cache: LocalImageCache,
    pub notifier: Arc<Notifier>,
    pub location: Arc<dyn LocationStore>,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        cache: LocalImageCache,
        notifier: Arc<Notifier>,
        location: Arc<dyn LocationStore>,
    ) -> Result<Self> {
        let mut templates = Environment::new();
        templates.add_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self {
            config,
            cache,
            notifier,
            location,
            templates,
        })
    }

    /// Location for display; a missing value is logged, not fatal
    async fn current_location(&self) -> Option<Location> {
        match self.location.read(&self.config.location.key).await {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

impl IntoResponse for BucketwatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            BucketwatchError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }
        (status, status.canonical_reason().unwrap_or("Error")).into_response()
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pages
        .route("/", get(index_page))
        .route("/image/:filename", get(image_file))
        // Real-time channel
        .route("/ws", get(ws_handler))
        // API endpoints
        .route("/api/images", get(api_images))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let images = state.cache.list_images().await?;
    let recent = state.notifier.recent(&images);
    let location = state.current_location().await;

    let template = state.templates.get_template("index.html")?;
    let html = template.render(context! { images => images, recent => recent, location => location })?;
    Ok(Html(html))
}

/// Stream a cached image verbatim
async fn image_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response> {
    let path = state.cache.open_path(&filename).await?;
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

// === API Handlers ===

#[derive(Serialize)]
struct ImagesResponse {
    images: Vec<String>,
    recent: Vec<String>,
    clients: usize,
}

async fn api_images(State(state): State<Arc<AppState>>) -> Result<Json<ImagesResponse>> {
    let images = state.cache.list_images().await?;
    let recent = state.notifier.recent(&images);
    Ok(Json(ImagesResponse {
        images,
        recent,
        clients: state.notifier.client_count(),
    }))
}

// === WebSocket ===

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ClientEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot encode {:?}: {}", event, e);
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4();
    info!(%client_id, "A client connected");

    // subscribe before catching up so no download slips between the two
    let mut updates = state.notifier.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let mut initial = Vec::new();
    if let Some(location) = state.current_location().await {
        initial.push(ClientEvent::LocationData(location));
    }
    match state.cache.list_images().await {
        Ok(images) => initial.extend(state.notifier.catch_up(&images)),
        Err(e) => error!(%client_id, "Error reading the local folder: {}", e),
    }

    for event in &initial {
        if !send_event(&mut sender, event).await {
            info!(%client_id, "Client went away during catch-up");
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(event) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%client_id, "Client lagging, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // nothing is expected from clients
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%client_id, "Client disconnected");
}

/// Serve until `shutdown` flips to true
pub async fn start_server(
    state: Arc<AppState>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Backend server running on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecencyConfig;
    use crate::location::{NoLocationStore, StaticLocationStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    const HERE: Location = Location { latitude: 12.9716, longitude: 77.5946 };

    fn state_with(location: Arc<dyn LocationStore>) -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalImageCache::open(&dir.path().join("cache"), ".jpg").unwrap();
        let notifier = Arc::new(Notifier::new(RecencyConfig::default(), ".jpg"));
        let state = AppState::new(AppConfig::default(), cache, notifier, location).unwrap();
        (dir, Arc::new(state))
    }

    fn state() -> (tempfile::TempDir, Arc<AppState>) {
        state_with(Arc::new(StaticLocationStore(HERE)))
    }

    fn put(state: &AppState, name: &str, body: &[u8]) {
        std::fs::write(state.cache.root().join(name), body).unwrap();
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = create_router(state)
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_index_lists_images_and_location() {
        let (_dir, state) = state();
        put(&state, "emg_101501.jpg", b"jpeg");
        put(&state, "emg_101602.jpg", b"jpeg");

        let (status, body) = get(state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("emg_101501.jpg"));
        assert!(body.contains("emg_101602.jpg"));
        assert!(body.contains("12.9716, 77.5946"));
    }

    #[tokio::test]
    async fn test_index_without_location() {
        let (_dir, state) = state_with(Arc::new(NoLocationStore));
        let (status, body) = get(state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Location unavailable"));
        assert!(body.contains("No images yet"));
    }

    #[tokio::test]
    async fn test_index_encodes_image_links() {
        let (_dir, state) = state();
        put(&state, "emg#1_101500.jpg", b"jpeg");

        let (_, body) = get(state.clone(), "/").await;
        assert!(body.contains("src=\"/image/emg%231"));
        assert!(!body.contains("src=\"/image/emg#1"));

        let (status, body) = get(state, "/image/emg%231_101500.jpg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "jpeg");
    }

    #[tokio::test]
    async fn test_image_is_served_verbatim() {
        let (_dir, state) = state();
        put(&state, "emg_101501.jpg", b"\xff\xd8jpeg-bytes");

        let response = create_router(state)
            .oneshot(HttpRequest::builder().uri("/image/emg_101501.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"\xff\xd8jpeg-bytes");
    }

    #[tokio::test]
    async fn test_missing_image_is_404() {
        let (_dir, state) = state();
        let (status, _) = get(state, "/image/emg_000000.jpg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let (dir, state) = state();
        std::fs::write(dir.path().join("secret.jpg"), b"secret").unwrap();

        let (status, body) = get(state.clone(), "/image/..%2Fsecret.jpg").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.contains("secret"));

        let (status, _) = get(state.clone(), "/image/..%2F..%2Fetc%2Fpasswd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(state.clone(), "/image/..").await;
        assert!(status.is_client_error());

        let (status, _) = get(state, "/image/../../etc/passwd").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_api_images() {
        let (_dir, state) = state();
        put(&state, "emg_095000.jpg", b"jpeg");
        put(&state, "emg_100100.jpg", b"jpeg");
        put(&state, "emg_100200.jpg", b"jpeg");

        let (status, body) = get(state, "/api/images").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["images"].as_array().unwrap().len(), 3);
        assert_eq!(json["recent"], serde_json::json!(["emg_100100.jpg", "emg_100200.jpg"]));
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = state();
        assert_eq!(get(state, "/health").await, (StatusCode::OK, "ok".to_string()));
    }

    async fn next_event<S>(socket: &mut S) -> ClientEvent
    where
        S: futures_util::Stream<Item = tokio_tungstenite::tungstenite::Result<WsMessage>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("timed out waiting for event")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn spawn_server(
        state: Arc<AppState>,
    ) -> (String, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = watch::channel(false);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let server = tokio::spawn(start_server(state, addr, rx));
        (format!("ws://{}/ws", addr), tx, server)
    }

    async fn connect(
        url: &str,
    ) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
        loop {
            match connect_async(url).await {
                Ok((socket, _)) => return socket,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_catch_up_and_broadcast() {
        let (_dir, state) = state();
        put(&state, "emg_100000.jpg", b"jpeg");
        put(&state, "emg_100200.jpg", b"jpeg");

        let (url, tx, server) = spawn_server(state.clone()).await;
        let mut first = connect(&url).await;

        assert_eq!(next_event(&mut first).await, ClientEvent::LocationData(HERE));
        assert_eq!(next_event(&mut first).await, ClientEvent::new_image("emg_100000.jpg"));
        assert_eq!(next_event(&mut first).await, ClientEvent::new_image("emg_100200.jpg"));

        // a second client gets the location but not the already-pushed images
        let mut second = connect(&url).await;
        assert_eq!(next_event(&mut second).await, ClientEvent::LocationData(HERE));

        while state.notifier.client_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        state.notifier.broadcast(ClientEvent::new_image("emg_100300.jpg"));
        assert_eq!(next_event(&mut first).await, ClientEvent::new_image("emg_100300.jpg"));
        assert_eq!(next_event(&mut second).await, ClientEvent::new_image("emg_100300.jpg"));

        first.close(None).await.unwrap();
        second.close(None).await.unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_websocket_without_location_still_catches_up() {
        let (_dir, state) = state_with(Arc::new(NoLocationStore));
        put(&state, "emg_100000.jpg", b"jpeg");

        let (url, tx, server) = spawn_server(state).await;
        let mut socket = connect(&url).await;
        assert_eq!(next_event(&mut socket).await, ClientEvent::new_image("emg_100000.jpg"));

        socket.close(None).await.unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
    }
}

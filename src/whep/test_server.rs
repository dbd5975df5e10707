//! Local WHEP endpoint for tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::Router;

pub const ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=sendonly\r\n";
pub const RESOURCE_PATH: &str = "/whep/resource/1";

pub struct ServerState {
    pub status: StatusCode,
    pub body: String,
    pub offers: Mutex<Vec<String>>,
    pub authorization: Mutex<Option<String>>,
    pub deletes: AtomicUsize,
}

impl ServerState {
    pub fn offers(&self) -> Vec<String> {
        self.offers.lock().unwrap().clone()
    }

    pub fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl TestServer {
    /// Endpoint answering 201 with [`ANSWER`]
    pub async fn answering() -> Self {
        Self::start(StatusCode::CREATED, ANSWER).await
    }

    pub async fn start(status: StatusCode, body: &str) -> Self {
        let state = Arc::new(ServerState {
            status,
            body: body.to_string(),
            offers: Mutex::new(Vec::new()),
            authorization: Mutex::new(None),
            deletes: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/whep", post(post_offer))
            .route(RESOURCE_PATH, delete(delete_resource))
            .route("/redirect", post(redirect))
            .route("/loop", post(redirect_loop))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn post_offer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != "application/sdp" {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    *state.authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.offers.lock().unwrap().push(body);

    (
        state.status,
        [
            (header::CONTENT_TYPE, "application/sdp"),
            (header::LOCATION, RESOURCE_PATH),
        ],
        state.body.clone(),
    )
        .into_response()
}

async fn delete_resource(State(state): State<Arc<ServerState>>) -> StatusCode {
    state.deletes.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn redirect() -> Response {
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/whep")]).into_response()
}

async fn redirect_loop() -> Response {
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/loop")]).into_response()
}

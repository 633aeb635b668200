//! In-process HTTP fixture server for tests.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A canned response
#[derive(Debug, Clone)]
pub struct Fixture {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Fixture {
    pub fn new(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body: body.into(),
        }
    }

    /// HTML page padded past the render-fallback threshold
    pub fn html(body: &str) -> Self {
        let padding = "<p>".to_string() + &"lorem ipsum ".repeat(20) + "</p>";
        Self::new(
            "text/html; charset=utf-8",
            format!("<html><body>{body}{padding}</body></html>"),
        )
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::new("application/json", value.to_string())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

#[derive(Default)]
struct FixtureState {
    routes: Mutex<HashMap<String, Vec<Fixture>>>,
    hits: Mutex<HashMap<String, usize>>,
    bodies: Mutex<HashMap<String, Vec<Bytes>>>,
}

/// Serves fixtures on 127.0.0.1 and counts requests per path.
///
/// A path registered several times answers with its fixtures in order and then
/// keeps repeating the last one.
pub struct FixtureServer {
    base: String,
    state: Arc<FixtureState>,
}

impl FixtureServer {
    pub async fn start(routes: Vec<(&str, Fixture)>) -> Self {
        let state = Arc::new(FixtureState::default());
        {
            let mut map = state.routes.lock().unwrap();
            for (path, fixture) in routes {
                map.entry(path.to_string()).or_default().push(fixture);
            }
        }

        let app = Router::new().fallback(serve).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Request bodies received on `path`, parsed as JSON
    pub fn json_bodies(&self, path: &str) -> Vec<serde_json::Value> {
        self.state
            .bodies
            .lock()
            .unwrap()
            .get(path)
            .map(|bodies| {
                bodies
                    .iter()
                    .filter_map(|b| serde_json::from_slice(b).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn serve(State(state): State<Arc<FixtureState>>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let hit = {
        let mut hits = state.hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };
    state
        .bodies
        .lock()
        .unwrap()
        .entry(path.clone())
        .or_default()
        .push(body);

    let fixture = state.routes.lock().unwrap().get(&path).and_then(|list| {
        list.get(hit - 1).or_else(|| list.last()).cloned()
    });

    match fixture {
        Some(f) => (
            StatusCode::from_u16(f.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, f.content_type)],
            f.body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

use async_trait::async_trait;
use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_graceful_shutdown::SubsystemHandle;

use paddock_core::{CaptureFormat, RecordType};
use paddock_server::{
    hub::{Sink, SinkError},
    recording::{RecordingError, ReplayError},
    Pipeline, RecordingRequest, VERSION,
};

const PING_URI: &str = "/ping";
const SNAPSHOT_URI: &str = "/api/snapshot";
const LIVE_URI: &str = "/api/live";
const RECORDING_START_URI: &str = "/api/recording/start";
const RECORDING_STOP_URI: &str = "/api/recording/stop";
const RECORDING_STATUS_URI: &str = "/api/recording/status";
const RECORDINGS_URI: &str = "/api/recordings";
const REPLAY_URI: &str = "/api/replay";
const SOURCE_URI: &str = "/api/source";

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Socket operation failed")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Recording(e) => recording_status_code(e),
            WebError::Replay(e) => match e {
                ReplayError::Open { .. } => StatusCode::NOT_FOUND,
                ReplayError::AlreadyRunning => StatusCode::CONFLICT,
                ReplayError::SwitchTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                ReplayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ReplayError::Capture(e) => recording_status_code(e),
            },
        };
        (status, self.to_string()).into_response()
    }
}

fn recording_status_code(e: &RecordingError) -> StatusCode {
    match e {
        RecordingError::AlreadyActive(_) | RecordingError::NotActive => StatusCode::CONFLICT,
        RecordingError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
        RecordingError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Clone)]
pub struct Web {
    pipeline: Pipeline,
    port: u16,
    shutdown_tx: broadcast::Sender<()>,
}

impl Web {
    pub fn new(pipeline: Pipeline, port: u16) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Web {
            pipeline,
            port,
            shutdown_tx,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), WebError> {
        let port = self.port;
        let listener =
            TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
                .await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        let hub = self.pipeline.hub().clone();

        let app = Router::new()
            .route(PING_URI, get(ping))
            .route(SNAPSHOT_URI, get(get_snapshot))
            .route(LIVE_URI, get(live_handler))
            .route(RECORDING_START_URI, post(start_recording_handler))
            .route(RECORDING_STOP_URI, post(stop_recording_handler))
            .route(RECORDING_STATUS_URI, get(get_recording_status))
            .route(RECORDINGS_URI, get(list_recordings))
            .route(REPLAY_URI, post(start_replay_handler))
            .route(SOURCE_URI, get(get_source))
            .with_state(self)
            .into_make_service_with_connect_info::<SocketAddr>();

        info!("Starting HTTP web server on port {}", port);

        let result = tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                let _ = shutdown_tx.send(());
                Ok(())
            },
            r = axum::serve(listener, app)
                    .with_graceful_shutdown(
                        async move {
                            _ = shutdown_rx.recv().await;
                        }
                    ) => {
                r.map_err(WebError::Io)
            }
        };

        hub.close_all();
        result
    }
}

async fn ping() -> String {
    format!("Pong from paddock-server {}", VERSION)
}

async fn get_snapshot(State(state): State<Web>) -> Response {
    Json(state.pipeline.snapshot()).into_response()
}

#[debug_handler]
async fn live_handler(
    State(state): State<Web>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    debug!("live request from {}", addr);

    ws.on_upgrade(move |socket| async move {
        let sink = WebSocketSink { socket, peer: addr };
        state.pipeline.subscribe(sink);
    })
}

/// Sends every record as a JSON text frame
struct WebSocketSink {
    socket: WebSocket,
    peer: SocketAddr,
}

#[async_trait]
impl Sink for WebSocketSink {
    fn describe(&self) -> String {
        self.peer.to_string()
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn closed(&mut self) {
        // Incoming frames other than Close are ignored
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct StartRecordingBody {
    filename: Option<String>,
    types: Option<Vec<RecordType>>,
    format: Option<CaptureFormat>,
}

async fn start_recording_handler(
    State(state): State<Web>,
    Json(body): Json<StartRecordingBody>,
) -> Result<Response, WebError> {
    let request = RecordingRequest {
        filename: body.filename,
        types: body.types,
        format: body.format,
    };
    let status = state.pipeline.start_recording(request)?;
    Ok((StatusCode::OK, Json(status)).into_response())
}

async fn stop_recording_handler(State(state): State<Web>) -> Result<Response, WebError> {
    let status = state.pipeline.stop_recording()?;
    Ok(Json(status).into_response())
}

async fn get_recording_status(State(state): State<Web>) -> Response {
    Json(state.pipeline.recording_status()).into_response()
}

async fn list_recordings(State(state): State<Web>) -> Response {
    Json(state.pipeline.list_captures()).into_response()
}

#[derive(Deserialize, Debug)]
struct StartReplayBody {
    filename: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayStarted {
    filename: String,
}

async fn start_replay_handler(
    State(state): State<Web>,
    Json(body): Json<StartReplayBody>,
) -> Result<Response, WebError> {
    state.pipeline.start_replay(&body.filename)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ReplayStarted {
            filename: body.filename,
        }),
    )
        .into_response())
}

async fn get_source(State(state): State<Web>) -> Response {
    Json(state.pipeline.source_status()).into_response()
}

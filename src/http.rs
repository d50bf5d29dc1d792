use crate::mac;
use crate::mac::MacAddr;
use crate::udp;
use crate::udp::UdpClient;
use axum::body::Bytes;
use axum::extract;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::middleware;
use axum::response;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing;
use axum::Router;
use lazy_static::lazy_static;
use log::{info, warn};
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

const SUCCESS_MESSAGE: &str = "magic packet successfully sent";

lazy_static! {
    static ref WAKE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "wagow_wake_requests_total",
        "Wake requests handled, partitioned by result.",
        &["result"]
    )
    .expect("wake request counter is registered once");
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid target parameter")]
    InvalidTarget(#[from] mac::Error),
    #[error("malformed json body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error(transparent)]
    Wake(#[from] udp::Error),
    #[error("wake task did not complete")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_) | Self::Json(_) | Self::Form(_) => StatusCode::BAD_REQUEST,
            Self::Wake(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Wake(udp::Error::ResolutionError { .. })
            | Self::Wake(udp::Error::TransmissionError(_)) => StatusCode::BAD_GATEWAY,
            Self::Wake(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Body of a wake request, sent either as json or as a url encoded form.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct WakeRequest {
    // Destination host, optionally with a port. Usually a broadcast address.
    pub address: String,
    // Hardware address of the machine to wake.
    pub target: String,
    // SecureOn password, sent as raw bytes.
    pub password: String,
}

impl WakeRequest {
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, Error> {
        let is_json = content_type
            .map(|c| c.trim_start().starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            Ok(serde_json::from_slice(body)?)
        } else {
            Ok(serde_urlencoded::from_bytes(body)?)
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<UdpClient>,
}

pub fn router(client: Arc<UdpClient>) -> Router {
    Router::new()
        .route("/", routing::post(wake))
        .route("/varz", routing::get(varz))
        .route_layer(middleware::from_fn(add_observability))
        .with_state(AppState { client })
}

async fn handle_wake(
    state: &AppState,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<&'static str, Error> {
    let req = WakeRequest::from_body(content_type, body)?;
    let target: MacAddr = req.target.parse()?;
    info!("waking {} via {:?}", target, req.address);

    // Name resolution can block, keep it off the async workers.
    let client = state.client.clone();
    tokio::task::spawn_blocking(move || {
        client.wake(&req.address, target.as_bytes(), &req.password)
    })
    .await??;
    Ok(SUCCESS_MESSAGE)
}

async fn wake(
    state: extract::State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let result = handle_wake(&state, content_type, &body).await;
    let label = match &result {
        Ok(_) => "sent",
        Err(e) if e.status().is_client_error() => "rejected",
        Err(e) => {
            warn!("wake failed: {}", e);
            "failed"
        }
    };
    WAKE_REQUESTS.with_label_values(&[label]).inc();
    result
}

fn render_metrics() -> Result<String, prometheus::Error> {
    prometheus::TextEncoder::new().encode_to_string(&prometheus::gather())
}

async fn varz() -> response::Result<String> {
    render_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into())
}

async fn add_observability<B>(
    req: Request<B>,
    next: middleware::Next<B>,
) -> response::Result<Response> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let resp = next.run(req).await;
    info!(
        "{method} {path} {status} {elapsed:?}",
        status = resp.status().as_str(),
        elapsed = start.elapsed(),
    );
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use crate::http::*;
    use std::net::UdpSocket;
    use std::time::Duration;

    const JSON: Option<&str> = Some("application/json");
    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");

    fn state() -> AppState {
        AppState {
            client: Arc::new(UdpClient::new().unwrap()),
        }
    }

    #[test]
    fn test_json_request() {
        let req = WakeRequest::from_body(
            Some("application/json; charset=utf-8"),
            br#"{"address": "10.0.0.255:7", "target": "aa:bb:cc:dd:ee:ff"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            WakeRequest {
                address: "10.0.0.255:7".to_string(),
                target: "aa:bb:cc:dd:ee:ff".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_form_request() {
        let req = WakeRequest::from_body(
            FORM,
            b"address=wol.example.com&target=aa-bb-cc-dd-ee-ff&password=abcd",
        )
        .unwrap();
        assert_eq!(req.address, "wol.example.com");
        assert_eq!(req.target, "aa-bb-cc-dd-ee-ff");
        assert_eq!(req.password, "abcd");
    }

    #[test]
    fn test_missing_content_type_is_form() {
        let req = WakeRequest::from_body(None, b"target=aa%3Abb%3Acc%3Add%3Aee%3Aff").unwrap();
        assert_eq!(req.target, "aa:bb:cc:dd:ee:ff");
        assert_eq!(req.address, "");
    }

    #[test]
    fn test_malformed_json() {
        let err = WakeRequest::from_body(JSON, b"{").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                Error::Wake(udp::Error::InvalidAddress("".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Wake(udp::Error::Packet(crate::wol::Error::InvalidPassword(3))),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Wake(udp::Error::TransmissionError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "unreachable",
                ))),
                StatusCode::BAD_GATEWAY,
            ),
            (Error::Wake(udp::Error::Closed), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[tokio::test]
    async fn test_wake_over_loopback() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let body = format!(
            r#"{{"address": "127.0.0.1:{}", "target": "AA:BB:CC:DD:EE:FF", "password": "wxyz"}}"#,
            rx.local_addr().unwrap().port()
        );

        let msg = handle_wake(&state(), JSON, body.as_bytes()).await.unwrap();
        assert_eq!(msg, "magic packet successfully sent");

        let mut buf = [0u8; 256];
        let (len, _) = rx.recv_from(&mut buf).unwrap();
        assert_eq!(len, 106);
        assert_eq!(&buf[6..12], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(&buf[102..106], b"wxyz");
    }

    #[tokio::test]
    async fn test_wake_invalid_target() {
        let err = handle_wake(&state(), FORM, b"address=127.0.0.1&target=nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)));
        assert_eq!(err.to_string(), "invalid target parameter");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wake_reports_core_error() {
        let err = handle_wake(&state(), FORM, b"address=&target=aa:bb:cc:dd:ee:ff")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid address");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    fn wake_count(label: &str) -> u64 {
        WAKE_REQUESTS.with_label_values(&[label]).get()
    }

    fn form_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_handler_counts_results() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let state = state();

        let sent = wake_count("sent");
        let body = format!(
            "address=127.0.0.1:{}&target=aa:bb:cc:dd:ee:ff",
            rx.local_addr().unwrap().port()
        );
        let resp = wake(extract::State(state.clone()), form_headers(), Bytes::from(body))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(wake_count("sent") > sent);
        let mut buf = [0u8; 256];
        assert_eq!(rx.recv_from(&mut buf).unwrap().0, 102);

        let rejected = wake_count("rejected");
        let resp = wake(
            extract::State(state.clone()),
            form_headers(),
            Bytes::from_static(b"address=127.0.0.1&target=aa:bb"),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(wake_count("rejected") > rejected);

        state.client.close();
        let failed = wake_count("failed");
        let resp = wake(
            extract::State(state),
            form_headers(),
            Bytes::from_static(b"address=127.0.0.1&target=aa:bb:cc:dd:ee:ff"),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(wake_count("failed") > failed);

        let metrics = render_metrics().unwrap();
        assert!(metrics.contains("wagow_wake_requests_total{result=\"sent\"}"));
        assert!(metrics.contains("wagow_wake_requests_total{result=\"rejected\"}"));
    }

    #[tokio::test]
    async fn test_wake_closed_client() {
        let state = state();
        state.client.close();
        let err = handle_wake(&state, FORM, b"address=127.0.0.1&target=aa:bb:cc:dd:ee:ff")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Wake(udp::Error::Closed)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

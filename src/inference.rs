//! Bridge to a remote classifier service.
//!
//! A volume is sent as raw native-endian sample bytes with JSON metadata; the
//! service answers with a label volume of the same shape. Retry and timeout
//! policy belong to the caller.

use crate::enums::Datatype;
use crate::mask::Mask;
use crate::volume::{Dimensions, Header, Volume, VolumeError, Voxel, with_samples};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;

pub const METADATA_HEADER: &str = "X-Volume-Metadata";
pub const DATATYPE_HEADER: &str = "X-Volume-Datatype";

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout")]
    Timeout,

    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Failed to encode request metadata: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout
        } else if err.is_connect() {
            InferenceError::Connection(err.to_string())
        } else {
            InferenceError::Http(err.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceMetadata {
    /// (x, y, z)
    pub dims: [usize; 3],
    /// NIfTI datatype code of the body
    pub datatype: i16,
    pub model: String,
    pub pix_dims: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct InferenceRequest {
    pub metadata: InferenceMetadata,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InferenceResponse {
    pub datatype: Datatype,
    pub body: Vec<u8>,
}

/// One request/response exchange with a classifier
pub trait InferenceTransport: Send + Sync {
    fn send(
        &self,
        request: InferenceRequest,
    ) -> BoxFuture<'_, Result<InferenceResponse, InferenceError>>;
}

/// Serialize `volume` for the classifier
pub fn encode_request(volume: &Volume, model: &str) -> Result<InferenceRequest, InferenceError> {
    let dims = volume.dimensions();
    let (px, py, pz) = volume.header().pix_dims;
    let body = with_samples!(volume.data(), samples => {
        bytemuck::cast_slice::<_, u8>(samples).to_vec()
    });
    Ok(InferenceRequest {
        metadata: InferenceMetadata {
            dims: [dims.x, dims.y, dims.z],
            datatype: volume.datatype().code(),
            model: model.to_string(),
            pix_dims: [px, py, pz],
        },
        body,
    })
}

/// Interpret a response body as labels shaped `dims`
///
/// Non-byte samples are stored the way a `Uint8Array` would store them:
/// truncated toward zero and wrapped modulo 256, non-finite values become 0.
///
/// # Errors
///
/// [`InferenceError::MalformedPayload`] when the body length does not match
/// `dims` and the declared datatype.
pub fn decode_labels(
    response: &InferenceResponse,
    dims: Dimensions,
    header: &Header,
) -> Result<Mask, InferenceError> {
    let expected = dims.len() * response.datatype.size_of();
    if response.body.len() != expected {
        return Err(InferenceError::MalformedPayload(format!(
            "expected {expected} bytes for {dims:?} {:?}, got {}",
            response.datatype,
            response.body.len()
        )));
    }

    let labels = match response.datatype {
        Datatype::U8 => response.body.clone(),
        Datatype::I16 => coerce::<i16>(&response.body),
        Datatype::U16 => coerce::<u16>(&response.body),
        Datatype::I32 => coerce::<i32>(&response.body),
        Datatype::F32 => coerce::<f32>(&response.body),
        Datatype::F64 => coerce::<f64>(&response.body),
    };

    let header = Header::with_spacing(header.pix_dims);
    Ok(Mask::from_vec(labels, dims, header)?)
}

fn coerce<T: Voxel>(body: &[u8]) -> Vec<u8> {
    bytemuck::pod_collect_to_vec::<u8, T>(body)
        .into_iter()
        .map(|v| to_label_byte(v.to_f64()))
        .collect()
}

#[inline]
fn to_label_byte(value: f64) -> u8 {
    if value.is_finite() {
        value.trunc().rem_euclid(256.0) as u8
    } else {
        0
    }
}

/// Send `volume` to `transport` and turn the reply into a mask
pub async fn infer(
    transport: &dyn InferenceTransport,
    volume: &Volume,
    model: &str,
) -> Result<Mask, InferenceError> {
    let started = Instant::now();
    let request = encode_request(volume, model)?;
    debug!(model, bytes = request.body.len(), "sending volume for inference");
    let response = transport.send(request).await?;
    let mask = decode_labels(&response, volume.dimensions(), volume.header())?;
    info!(
        model,
        datatype = ?response.datatype,
        foreground = mask.count_nonzero(),
        "inference finished in {:.2}ms",
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(mask)
}

/// POSTs the raw volume to `{base_url}/segment`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let url = format!("{}/segment", self.base_url);
        let metadata = serde_json::to_string(&request.metadata)?;
        let response = self
            .client
            .post(&url)
            .header(METADATA_HEADER, metadata)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let datatype = match response.headers().get(DATATYPE_HEADER) {
            None => Datatype::U8,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|code| code.trim().parse::<i16>().ok())
                .and_then(Datatype::from_code)
                .ok_or_else(|| {
                    InferenceError::MalformedPayload(format!("unsupported datatype {value:?}"))
                })?,
        };
        let body = response.bytes().await?.to_vec();
        Ok(InferenceResponse { datatype, body })
    }
}

impl InferenceTransport for HttpTransport {
    fn send(
        &self,
        request: InferenceRequest,
    ) -> BoxFuture<'_, Result<InferenceResponse, InferenceError>> {
        Box::pin(self.post(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct StubTransport {
        reply: Result<InferenceResponse, u16>,
        seen: Mutex<Vec<InferenceMetadata>>,
    }

    impl InferenceTransport for StubTransport {
        fn send(
        &self,
        request: InferenceRequest,
    ) -> BoxFuture<'_, Result<InferenceResponse, InferenceError>> {
            self.seen.lock().unwrap().push(request.metadata);
            let reply = match &self.reply {
                Ok(response) => Ok(response.clone()),
                Err(status) => Err(InferenceError::ServerError {
                    status: *status,
                    message: "model not loaded".to_string(),
                }),
            };
            async move { reply }.boxed()
        }
    }

    fn volume() -> Volume {
        let dims = Dimensions::new(2, 2, 1);
        let header = Header::with_spacing((0.8, 0.8, 3.0));
        Volume::from_vec_exact(vec![-5i16, 0, 300, 1200], dims, header).unwrap()
    }

    #[test]
    fn test_encode_request_raw_bytes() {
        let request = encode_request(&volume(), "brain-v2").unwrap();
        assert_eq!(request.body.len(), 8);
        assert_eq!(&request.body[4..6], &300i16.to_ne_bytes());
        assert_eq!(request.metadata.dims, [2, 2, 1]);
        assert_eq!(request.metadata.datatype, 4);
        assert_eq!(request.metadata.pix_dims, [0.8, 0.8, 3.0]);
        let json = serde_json::to_value(&request.metadata).unwrap();
        assert_eq!(json["model"], "brain-v2");
    }

    #[test]
    fn test_decode_coerces_wide_labels() {
        let values = [1.9f32, -1.0, 258.0, f32::NAN];
        let response = InferenceResponse {
            datatype: Datatype::F32,
            body: bytemuck::cast_slice(&values).to_vec(),
        };
        let mask = decode_labels(&response, Dimensions::new(4, 1, 1), &Header::default()).unwrap();
        assert_eq!(mask.as_slice().unwrap(), &[1, 255, 2, 0]);
        assert_eq!(mask.header().datatype, Datatype::U8);

        // floats this large are multiples of 256, past the range of i64 too
        let values = [1e20f64, -1e20, 2f64.powi(70), f64::MAX];
        let response = InferenceResponse {
            datatype: Datatype::F64,
            body: bytemuck::cast_slice(&values).to_vec(),
        };
        let mask = decode_labels(&response, Dimensions::new(4, 1, 1), &Header::default()).unwrap();
        assert_eq!(mask.as_slice().unwrap(), &[0, 0, 0, 0]);

        let values = [-300i32, 511, i32::MIN, i32::MAX];
        let response = InferenceResponse {
            datatype: Datatype::I32,
            body: bytemuck::cast_slice(&values).to_vec(),
        };
        let mask = decode_labels(&response, Dimensions::new(4, 1, 1), &Header::default()).unwrap();
        assert_eq!(mask.as_slice().unwrap(), &[212, 255, 0, 255]);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let response = InferenceResponse {
            datatype: Datatype::I16,
            body: vec![0; 7],
        };
        let result = decode_labels(&response, Dimensions::new(2, 2, 1), &Header::default());
        assert!(matches!(result, Err(InferenceError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_infer_round_trip_through_transport() {
        let transport = StubTransport {
            reply: Ok(InferenceResponse {
                datatype: Datatype::U8,
                body: vec![0, 1, 2, 1],
            }),
            seen: Mutex::new(Vec::new()),
        };
        let mask = infer(&transport, &volume(), "brain-v2").await.unwrap();
        assert_eq!(mask.count_nonzero(), 3);
        assert_eq!(mask.header().pix_dims, (0.8, 0.8, 3.0));
        assert_eq!(transport.seen.lock().unwrap()[0].model, "brain-v2");
    }

    #[tokio::test]
    async fn test_infer_reports_server_failure() {
        let transport = StubTransport {
            reply: Err(503),
            seen: Mutex::new(Vec::new()),
        };
        let err = infer(&transport, &volume(), "brain-v2").await.unwrap_err();
        assert_eq!(err.to_string(), "Server error (status 503): model not loaded");
    }

    #[test]
    fn test_http_transport_trims_base_url() {
        let transport = HttpTransport::new("http://localhost:8000/");
        assert_eq!(transport.base_url(), "http://localhost:8000");
    }

    /// Answer a single request on a local socket with a canned reply. The
    /// handle yields the request head as received.
    async fn serve_once(
        status: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> (HttpTransport, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut reply = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            reply.push_str(&format!("{name}: {value}\r\n"));
        }
        reply.push_str("\r\n");

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 4096];
            let head = loop {
                let n = socket.read(&mut buffer).await.unwrap();
                assert!(n > 0, "connection closed before the request head");
                received.extend_from_slice(&buffer[..n]);
                if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break String::from_utf8_lossy(&received[..end]).to_string();
                }
            };
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .map_or(0, |(_, value)| value.trim().parse::<usize>().unwrap());
            while received.len() < head.len() + 4 + content_length {
                let n = socket.read(&mut buffer).await.unwrap();
                assert!(n > 0, "connection closed before the request body");
                received.extend_from_slice(&buffer[..n]);
            }

            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
            head
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        (HttpTransport::with_client(&format!("http://{addr}/"), client), handle)
    }

    #[tokio::test]
    async fn test_http_posts_raw_volume_with_metadata() {
        let labels = [1i16, 2, 256, 5];
        let (transport, handle) = serve_once(
            "200 OK",
            &[(DATATYPE_HEADER, "4")],
            bytemuck::cast_slice(&labels).to_vec(),
        )
        .await;

        let mask = infer(&transport, &volume(), "brain-v2").await.unwrap();
        assert_eq!(mask.as_slice().unwrap(), &[1, 2, 0, 5]);

        let head = handle.await.unwrap();
        assert!(head.starts_with("POST /segment "), "{head}");
        let metadata = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case(METADATA_HEADER))
            .map(|(_, value)| value.trim().to_string())
            .unwrap();
        let metadata: InferenceMetadata = serde_json::from_str(&metadata).unwrap();
        assert_eq!(metadata.dims, [2, 2, 1]);
        assert_eq!(metadata.datatype, Datatype::I16.code());
        assert_eq!(metadata.model, "brain-v2");
    }

    #[tokio::test]
    async fn test_http_missing_datatype_header_means_bytes() {
        let (transport, handle) = serve_once("200 OK", &[], vec![0, 1, 1, 0]).await;
        let request = encode_request(&volume(), "brain-v2").unwrap();
        let response = transport.send(request).await.unwrap();
        handle.await.unwrap();
        assert_eq!(response.datatype, Datatype::U8);
        assert_eq!(response.body, vec![0, 1, 1, 0]);
    }

    #[tokio::test]
    async fn test_http_unknown_datatype_is_malformed() {
        let (transport, handle) =
            serve_once("200 OK", &[(DATATYPE_HEADER, "99")], vec![0; 4]).await;
        let request = encode_request(&volume(), "brain-v2").unwrap();
        let result = transport.send(request).await;
        handle.await.unwrap();
        assert!(
            matches!(&result, Err(InferenceError::MalformedPayload(m)) if m.contains("99")),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_http_error_status_is_server_error() {
        let (transport, handle) =
            serve_once("500 Internal Server Error", &[], b"boom".to_vec()).await;
        let err = infer(&transport, &volume(), "brain-v2").await.unwrap_err();
        handle.await.unwrap();
        match err {
            InferenceError::ServerError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

//! Communication with the verification backend.

use async_trait::async_trait;
use checkin_core::{
    ArrivalVerification, BackendFailure, MedicalRecordLookup, Mode, VerificationResponse,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const API_KEY_HEADER: &str = "x-internal-api-key";

const VERIFY_ARRIVAL_PATH: &str = "/api/v1/kiosk/verify-arrived-appointment";
const MEDICAL_RECORDS_PATH: &str = "/api/v1/kiosk/medical-records";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{}", .0.message)]
    Rejected(BackendFailure),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
    #[error("invalid API key header value")]
    InvalidApiKey,
}

impl BackendError {
    /// Collapse into the payload the outcome classifier consumes.
    pub fn into_failure(self) -> BackendFailure {
        match self {
            BackendError::Rejected(failure) => failure,
            other => BackendFailure::from_message(other.to_string()),
        }
    }
}

#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Match the still against today's appointments and mark the patient arrived.
    async fn verify_arrival(&self, image_base64: &str) -> Result<ArrivalVerification, BackendError>;
    /// Match the still and return the patient's medical records.
    async fn lookup_medical_records(
        &self,
        image_base64: &str,
    ) -> Result<MedicalRecordLookup, BackendError>;
}

/// Submit one still for the given mode, bounded by `timeout`.
///
/// Never retried; every failure is returned as a [`BackendFailure`].
pub async fn submit(
    backend: &dyn VerificationBackend,
    mode: Mode,
    image_base64: &str,
    timeout: Duration,
) -> Result<VerificationResponse, BackendFailure> {
    tracing::info!(%mode, bytes = image_base64.len(), "submitting still for verification");
    let call = async {
        match mode {
            Mode::AppointmentCheckIn => backend
                .verify_arrival(image_base64)
                .await
                .map(VerificationResponse::Arrival),
            Mode::EmergencyLookup => backend
                .lookup_medical_records(image_base64)
                .await
                .map(VerificationResponse::MedicalRecords),
        }
    };

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout)),
    };

    result.map_err(|e| {
        match &e {
            BackendError::Rejected(f) => {
                tracing::warn!(%mode, message = %f.message, "verification rejected")
            }
            other => tracing::error!(%mode, error = %other, "verification request failed"),
        }
        e.into_failure()
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivePhoto<'a> {
    live_photo_base64: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// HTTPS client for the kiosk API.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key).map_err(|_| BackendError::InvalidApiKey)?;
            headers.insert(API_KEY_HEADER, value);
        }
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<T> = response.json().await?;
            return Ok(envelope.data);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), body))
    }
}

/// Interpret a non-2xx response body.
fn error_from_body(status: u16, body: String) -> BackendError {
    match serde_json::from_str::<BackendFailure>(&body) {
        Ok(failure) if !failure.message.is_empty() => BackendError::Rejected(failure),
        _ => BackendError::UnexpectedResponse { status, body },
    }
}

#[async_trait]
impl VerificationBackend for HttpBackend {
    async fn verify_arrival(&self, image_base64: &str) -> Result<ArrivalVerification, BackendError> {
        let request = self
            .client
            .patch(format!("{}{VERIFY_ARRIVAL_PATH}", self.base_url))
            .json(&LivePhoto {
                live_photo_base64: image_base64,
            });
        self.send(request).await
    }

    async fn lookup_medical_records(
        &self,
        image_base64: &str,
    ) -> Result<MedicalRecordLookup, BackendError> {
        let request = self
            .client
            .post(format!("{}{MEDICAL_RECORDS_PATH}", self.base_url))
            .json(&LivePhoto {
                live_photo_base64: image_base64,
            });
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VerificationBackend for SlowBackend {
        async fn verify_arrival(&self, _: &str) -> Result<ArrivalVerification, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ArrivalVerification::default())
        }

        async fn lookup_medical_records(&self, _: &str) -> Result<MedicalRecordLookup, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Rejected(BackendFailure::from_message(
                "No medical records found",
            )))
        }
    }

    #[test]
    fn test_request_body_is_camel_case() {
        let body = serde_json::to_value(LivePhoto {
            live_photo_base64: "abc",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"livePhotoBase64": "abc"}));
    }

    #[test]
    fn test_success_envelope() {
        let env: Envelope<ArrivalVerification> = serde_json::from_str(
            r#"{"data": {"confidence": 0.91, "alreadyCheckedIn": true, "notificationSent": false}}"#,
        )
        .unwrap();
        assert!(env.data.already_checked_in);
        assert_eq!(env.data.confidence, 0.91);
    }

    #[test]
    fn test_structured_error_body() {
        let err = error_from_body(409, r#"{"message": "Patient already checked in"}"#.into());
        match err {
            BackendError::Rejected(f) => assert_eq!(f.message, "Patient already checked in"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unstructured_error_body() {
        let err = error_from_body(502, "<html>Bad Gateway</html>".into());
        assert!(matches!(
            err,
            BackendError::UnexpectedResponse { status: 502, .. }
        ));
        assert!(err.into_failure().message.contains("502"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_times_out() {
        let backend = SlowBackend {
            calls: AtomicUsize::new(0),
        };
        let failure = submit(
            &backend,
            Mode::AppointmentCheckIn,
            "abc",
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(failure.message.contains("timed out"), "{}", failure.message);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_routes_by_mode() {
        let backend = SlowBackend {
            calls: AtomicUsize::new(0),
        };
        let failure = submit(
            &backend,
            Mode::EmergencyLookup,
            "abc",
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert_eq!(failure.message, "No medical records found");
    }

    #[test]
    fn test_rejects_unprintable_api_key() {
        let err = HttpBackend::new("http://localhost", Some("bad\nkey"), Duration::from_secs(1));
        assert!(matches!(err, Err(BackendError::InvalidApiKey)));
    }
}

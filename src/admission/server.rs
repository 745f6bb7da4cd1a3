// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTPS endpoint for the validating admission webhook.
//!
//! The API server posts an `admission.k8s.io/v1` `AdmissionReview` to
//! [`WEBHOOK_VALIDATE_PATH`]; the request is handed to
//! [`PostgresValidator::admit`] and the decision is wrapped back into an
//! `AdmissionReview` response.

use super::validator::{AdmissionDecision, AdmissionRequest, PostgresValidator};
use crate::constants::{SERVER_BIND_ADDRESS, WEBHOOK_VALIDATE_PATH};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Incoming `AdmissionReview`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub request: Option<AdmissionRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatus {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Errors starting or running the webhook server.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("invalid bind address: {0}")]
    BindAddress(String),

    #[error("webhook server error: {0}")]
    Server(String),
}

/// Build an `AdmissionReview` response.
///
/// Denials carry `code` and `message` in the status block; allowed responses carry none.
#[must_use]
pub fn create_response(
    uid: &str,
    allowed: bool,
    code: u16,
    message: &str,
    reason: Option<&str>,
) -> AdmissionReviewResponse {
    AdmissionReviewResponse {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        response: AdmissionResponse {
            uid: uid.to_string(),
            allowed,
            status: (!allowed).then(|| AdmissionStatus {
                code,
                message: message.to_string(),
                reason: reason.map(String::from),
            }),
        },
    }
}

/// Turn a decision into the HTTP status and body returned to the API server.
#[must_use]
pub fn review_response(uid: &str, decision: &AdmissionDecision) -> (StatusCode, AdmissionReviewResponse) {
    match decision {
        AdmissionDecision::Allowed => (StatusCode::OK, create_response(uid, true, 200, "", None)),
        AdmissionDecision::Denied(message) => (
            StatusCode::OK,
            create_response(uid, false, 403, message, Some("Forbidden")),
        ),
        AdmissionDecision::NotReady => (
            StatusCode::SERVICE_UNAVAILABLE,
            create_response(
                uid,
                false,
                503,
                "admission validator is not initialized",
                Some("ServiceUnavailable"),
            ),
        ),
    }
}

/// Router serving [`WEBHOOK_VALIDATE_PATH`].
pub fn create_webhook_router(validator: Arc<PostgresValidator>) -> Router {
    Router::new()
        .route(WEBHOOK_VALIDATE_PATH, post(validate))
        .with_state(validator)
}

async fn validate(
    State(validator): State<Arc<PostgresValidator>>,
    Json(review): Json<AdmissionReview>,
) -> impl IntoResponse {
    let Some(request) = review.request else {
        error!("Admission review missing request");
        return (
            StatusCode::BAD_REQUEST,
            Json(create_response(
                "",
                false,
                400,
                "missing request in AdmissionReview",
                Some("BadRequest"),
            )),
        );
    };

    let decision = validator.admit(&request).await;
    let (status, body) = review_response(&request.uid, &decision);
    (status, Json(body))
}

/// Serve the webhook over TLS until the server fails.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be loaded or the server stops.
pub async fn run_webhook_server(
    validator: Arc<PostgresValidator>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), WebhookError> {
    let tls = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let ip: IpAddr = SERVER_BIND_ADDRESS
        .parse()
        .map_err(|e: std::net::AddrParseError| WebhookError::BindAddress(e.to_string()))?;
    let addr = SocketAddr::new(ip, port);
    info!(address = %addr, path = WEBHOOK_VALIDATE_PATH, "Admission webhook listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .serve(create_webhook_router(validator).into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission_request::AdmissionRequest;
use crate::admission_response::AdmissionResponse;

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
pub const ADMISSION_V1: &str = "admission.k8s.io/v1";
pub const ADMISSION_V1BETA1: &str = "admission.k8s.io/v1beta1";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode AdmissionReview: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported AdmissionReview apiVersion: {0:?}")]
    UnsupportedApiVersion(Option<String>),

    #[error("unexpected kind {0:?}, expected {ADMISSION_REVIEW_KIND}")]
    UnexpectedKind(Option<String>),

    #[error("no request object defined inside AdmissionReview object")]
    MissingRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

impl AdmissionReviewRequest {
    /// Decode the envelope sent by the API server. Both the `v1` and the
    /// `v1beta1` versions of the admission API are understood, they share
    /// the same schema.
    pub fn decode(body: &[u8]) -> Result<(String, AdmissionRequest), DecodeError> {
        let review: AdmissionReviewRequest = serde_json::from_slice(body)?;

        let api_version = match review.api_version.as_deref() {
            Some(v @ (ADMISSION_V1 | ADMISSION_V1BETA1)) => v.to_owned(),
            _ => return Err(DecodeError::UnsupportedApiVersion(review.api_version)),
        };
        if review.kind.as_deref() != Some(ADMISSION_REVIEW_KIND) {
            return Err(DecodeError::UnexpectedKind(review.kind));
        }
        let request = review.request.ok_or(DecodeError::MissingRequest)?;

        Ok((api_version, request))
    }
}

/// Best effort extraction of `request.uid` from a payload that could not
/// be decoded. Returns an empty string when nothing usable is found.
pub fn request_uid(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|review| {
            review
                .pointer("/request/uid")
                .and_then(|uid| uid.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub kind: String,

    pub api_version: String,

    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    /// The API server requires the response to use the same apiVersion of
    /// the request it sent.
    pub fn new(api_version: impl Into<String>, response: AdmissionResponse) -> Self {
        AdmissionReviewResponse {
            api_version: api_version.into(),
            kind: ADMISSION_REVIEW_KIND.to_owned(),
            response,
        }
    }
}

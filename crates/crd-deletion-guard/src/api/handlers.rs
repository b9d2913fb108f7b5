use axum::{
    body::Bytes,
    extract,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, Span};

use crate::{
    admission_request::AdmissionRequest,
    admission_response::AdmissionResponse,
    api::{
        admission_review::{
            request_uid, AdmissionReviewRequest, AdmissionReviewResponse, ADMISSION_V1,
        },
        api_error::ApiError,
        state::ApiServerState,
    },
};

pub(crate) const CANNOT_DESERIALIZE_REQUEST: &str = "Unable to deserialize request";

#[tracing::instrument(
    name = "validation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        operation=tracing::field::Empty,
        resource_group=tracing::field::Empty,
        resource_version=tracing::field::Empty,
        resource=tracing::field::Empty,
        allowed=tracing::field::Empty,
        response_code=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Decide whether a CustomResourceDefinition can be deleted.
///
/// The raw body is inspected by hand: empty bodies and payloads that are
/// not JSON are refused before any AdmissionReview is built, while every
/// decoding failure afterwards becomes a denial.
pub(crate) async fn validate_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        info!("request has no body");
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "request has no body"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != mime::APPLICATION_JSON.essence_str() {
        info!(
            actual = content_type,
            "invalid Content-Type expected `application/json`"
        );
        return Err(ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "invalid Content-Type, want `application/json`",
        ));
    }

    trace!(content = %String::from_utf8_lossy(&body), "received request");

    let admission_review = match AdmissionReviewRequest::decode(&body) {
        Ok((api_version, request)) => {
            populate_span_with_admission_request_data(&request);
            let response = state.validator.validate(&request).await;
            AdmissionReviewResponse::new(api_version, response.with_uid(request.uid))
        }
        Err(e) => {
            error!(error = %e, "unable to deserialize request");
            let response =
                AdmissionResponse::reject(CANNOT_DESERIALIZE_REQUEST).with_uid(request_uid(&body));
            AdmissionReviewResponse::new(ADMISSION_V1, response)
        }
    };

    populate_span_with_validation_results(&admission_review.response);

    let payload = serde_json::to_vec(&admission_review).map_err(|e| {
        error!(error = %e, "could not serialize response");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not serialize response: {e}"),
        )
    })?;
    trace!(content = %String::from_utf8_lossy(&payload), "sending response");
    debug!(
        allowed = admission_review.response.allowed,
        "admission review evaluated"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime::APPLICATION_JSON.essence_str())],
        payload,
    )
        .into_response())
}

pub(crate) async fn healthz_handler() -> &'static str {
    "OK"
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    Span::current().record("name", adm_req.name());
    Span::current().record("operation", adm_req.operation.as_str());
    Span::current().record("request_uid", adm_req.uid.as_str());
    Span::current().record("resource", adm_req.resource.resource.as_str());
    Span::current().record("resource_group", adm_req.resource.group.as_str());
    Span::current().record("resource_version", adm_req.resource.version.as_str());
}

fn populate_span_with_validation_results(response: &AdmissionResponse) {
    Span::current().record("allowed", response.allowed);
    if let Some(status) = &response.status {
        if let Some(code) = &status.code {
            Span::current().record("response_code", code);
        }
        if let Some(message) = &status.message {
            Span::current().record("response_message", message.as_str());
        }
    }
}

use axum::{http::StatusCode, response::IntoResponse};

#[derive(Debug)]
/// An error that can be returned by the API before, or after, an
/// AdmissionReview is processed. It is converted into a plain text response.
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

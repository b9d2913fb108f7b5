use serde::{Deserialize, Serialize};

/// HTTP code reported inside of the `Status` of every denial.
pub const DENIAL_CODE: u16 = 409;

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// Status contains extra details into why an admission request was denied.
    /// Only set when `allowed` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,
}

/// Value of Status.Status. Only denials carry a status, hence the single
/// variant.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum AdmissionResponseStatusValue {
    Failure,
}

/// StatusReason is a machine-readable description of why a request has
/// been denied. Only the reasons produced by this webhook are modeled.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum StatusReason {
    /// StatusReasonInvalid means the requested operation is not valid for
    /// the current state of the cluster.
    Invalid,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    /// Status of the operation, always "Failure".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatusValue>,

    /// A human-readable description of the status of this operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// A machine-readable description of why this operation is in the
    /// "Failure" status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StatusReason>,

    /// Extended data associated with the reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,

    /// Suggested HTTP return code for this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct StatusDetails {
    #[serde(default)]
    pub causes: Vec<StatusCause>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct StatusCause {
    // A human-readable description of the cause of the error. This field may be
    // presented as-is to a reader.
    pub message: String,
}

impl AdmissionResponse {
    /// Accept the request. The uid is filled by the transport layer.
    pub fn allow() -> AdmissionResponse {
        AdmissionResponse {
            allowed: true,
            ..Default::default()
        }
    }

    /// Deny the request with the given message. The message is reported
    /// both as the status message and as the only cause of the denial.
    pub fn reject(message: impl Into<String>) -> AdmissionResponse {
        let message = message.into();
        AdmissionResponse {
            allowed: false,
            status: Some(AdmissionResponseStatus {
                status: Some(AdmissionResponseStatusValue::Failure),
                reason: Some(StatusReason::Invalid),
                code: Some(DENIAL_CODE),
                details: Some(StatusDetails {
                    causes: vec![StatusCause {
                        message: message.clone(),
                    }],
                }),
                message: Some(message),
            }),
            ..Default::default()
        }
    }

    pub fn with_uid(self, uid: impl Into<String>) -> AdmissionResponse {
        AdmissionResponse {
            uid: uid.into(),
            ..self
        }
    }

    /// Message of the denial, if any
    pub fn message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn allowed_response_has_no_status() {
        let response = AdmissionResponse::allow().with_uid("uid");

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"uid": "uid", "allowed": true})
        );
    }

    #[test]
    fn rejected_response_wire_format() {
        let response = AdmissionResponse::reject("Unexpected resource kind").with_uid("uid");

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "uid": "uid",
                "allowed": false,
                "status": {
                    "status": "Failure",
                    "message": "Unexpected resource kind",
                    "reason": "Invalid",
                    "details": {
                        "causes": [{"message": "Unexpected resource kind"}]
                    },
                    "code": 409
                }
            })
        );
    }
}

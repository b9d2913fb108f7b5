use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info};

use crate::{
    admission_request::{AdmissionRequest, GroupVersionResource},
    admission_response::AdmissionResponse,
    config::CrdFilter,
    crd::CustomResourceDefinition,
    lister::{ListError, ResourceLister},
};

pub const CRD_API_GROUP: &str = "apiextensions.k8s.io";
pub const CRD_RESOURCE: &str = "customresourcedefinitions";

pub(crate) const UNEXPECTED_RESOURCE_KIND: &str = "Unexpected resource kind";
pub(crate) const CANNOT_UNMARSHAL_CRD: &str = "Cannot unmarshal CRD from spec";
pub(crate) const CANNOT_LIST_INSTANCES: &str = "Unable to get list of existing CRDs";

/// Decides whether the deletion of a CustomResourceDefinition can proceed.
///
/// The deletion is denied whenever at least one instance of the custom
/// resource still exists, or when that cannot be established.
pub struct CrdDeletionValidator {
    lister: Arc<dyn ResourceLister>,
    crd_filter: CrdFilter,
    list_timeout: Duration,
}

impl CrdDeletionValidator {
    pub fn new(
        lister: Arc<dyn ResourceLister>,
        crd_filter: CrdFilter,
        list_timeout: Duration,
    ) -> Self {
        Self {
            lister,
            crd_filter,
            list_timeout,
        }
    }

    /// Evaluate the request. The uid of the returned response is left
    /// empty, the caller is in charge of copying it from the request.
    pub async fn validate(&self, request: &AdmissionRequest) -> AdmissionResponse {
        if request.resource.group != CRD_API_GROUP {
            info!(
                actual = request.resource.group.as_str(),
                "expected resource to be {CRD_API_GROUP}"
            );
            return AdmissionResponse::reject(UNEXPECTED_RESOURCE_KIND);
        }

        if request.resource.resource != CRD_RESOURCE {
            info!(
                actual = request.resource.resource.as_str(),
                "expected resource to be {CRD_RESOURCE}"
            );
            return AdmissionResponse::reject(UNEXPECTED_RESOURCE_KIND);
        }

        let name = request.name();
        if !self.crd_filter.should_check(name) {
            debug!(name, "CRD not subject to the existence check, allowing delete");
            return AdmissionResponse::allow();
        }

        let crd = match CustomResourceDefinition::from_raw(request.old_object.as_ref()) {
            Ok(crd) => crd,
            Err(e) => {
                let old_object = request
                    .old_object
                    .as_ref()
                    .map(|raw| raw.0.to_string())
                    .unwrap_or_default();
                error!(
                    error = %e,
                    old_object = old_object.as_str(),
                    "cannot unmarshal CRD from spec"
                );
                return AdmissionResponse::reject(CANNOT_UNMARSHAL_CRD);
            }
        };

        let resource = crd.resource();
        let instances = match self.list_instances(&resource).await {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, schema = %resource, "unable to get list of existing CRDs");
                return AdmissionResponse::reject(CANNOT_LIST_INSTANCES);
            }
        };

        if instances != 0 {
            debug!(name, "at least one resource exists");
            return AdmissionResponse::reject(format!("There are still some {name} in the cluster"));
        }

        debug!(name, "found none, allowing delete");
        AdmissionResponse::allow()
    }

    async fn list_instances(&self, resource: &GroupVersionResource) -> Result<usize, ListError> {
        tokio::time::timeout(self.list_timeout, self.lister.list(resource, 1))
            .await
            .map_err(|_| ListError::Timeout {
                resource: resource.to_owned(),
                timeout: self.list_timeout,
            })?
    }
}

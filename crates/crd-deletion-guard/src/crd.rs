use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::admission_request::GroupVersionResource;

#[derive(Debug, Error)]
pub enum CrdParseError {
    #[error("the request does not carry the object being deleted")]
    MissingOldObject,

    #[error("cannot decode CustomResourceDefinition: {0}")]
    Json(#[from] serde_json::Error),
}

/// The subset of a CustomResourceDefinition needed to find its instances.
/// Missing and `null` fields are left empty instead of failing the parse.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CustomResourceDefinition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub spec: CrdSpec,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CrdSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: CrdNames,
    #[serde(default, deserialize_with = "null_as_default")]
    pub versions: Vec<CrdVersion>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CrdNames {
    #[serde(default, deserialize_with = "null_as_default")]
    pub plural: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CrdVersion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub served: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storage: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CustomResourceDefinition {
    pub fn from_raw(raw: Option<&RawExtension>) -> Result<Self, CrdParseError> {
        let raw = raw.ok_or(CrdParseError::MissingOldObject)?;
        Ok(serde_json::from_value(raw.0.clone())?)
    }

    /// Coordinate to query when looking for instances of this CRD.
    pub fn resource(&self) -> GroupVersionResource {
        self.spec.resource()
    }
}

impl CrdSpec {
    /// Pick the version used to list the instances of the CRD.
    ///
    /// Versions are scanned in declaration order: the first served version
    /// that is also the storage one wins. When no served version is the
    /// storage one, the last served version is used. The version is left
    /// empty when nothing is served.
    pub fn resource(&self) -> GroupVersionResource {
        let mut gvr = GroupVersionResource {
            group: self.group.clone(),
            resource: self.names.plural.clone(),
            ..Default::default()
        };

        for version in self.versions.iter().filter(|v| v.served) {
            gvr.version = version.name.clone();
            if version.storage {
                break;
            }
        }

        gvr
    }
}

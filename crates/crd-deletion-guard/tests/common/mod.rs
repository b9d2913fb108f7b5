use std::{
    collections::BTreeSet,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use crd_deletion_guard::{
    admission_request::GroupVersionResource,
    config::{Config, CrdFilter, TlsConfig, PORT},
    lister::{ListError, ResourceLister},
    CrdDeletionGuard,
};

/// Lister returning a fixed number of items and recording every call
#[derive(Default)]
pub(crate) struct FakeLister {
    items: usize,
    fail: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<GroupVersionResource>>,
}

impl FakeLister {
    pub(crate) fn returning(items: usize) -> Arc<Self> {
        Arc::new(Self {
            items,
            ..Default::default()
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requested(&self) -> Vec<GroupVersionResource> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceLister for FakeLister {
    async fn list(&self, resource: &GroupVersionResource, limit: u32) -> Result<usize, ListError> {
        assert_eq!(limit, 1);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(resource.to_owned());

        if self.fail {
            return Err(ListError::Timeout {
                resource: resource.to_owned(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(self.items)
    }
}

pub(crate) fn default_test_config(crds: &[&str]) -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], PORT)),
        kubeconfig: None,
        tls_config: TlsConfig {
            cert_file: PathBuf::from("/cert/cert"),
            key_file: PathBuf::from("/cert/key"),
        },
        crd_filter: CrdFilter::new(crds.iter().map(|n| n.to_string()).collect::<BTreeSet<_>>()),
        list_timeout: Duration::from_secs(1),
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) fn app(config: Config, lister: Arc<FakeLister>) -> Router {
    CrdDeletionGuard::new_with_lister(config, lister).router()
}

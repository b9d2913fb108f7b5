use std::{path::Path, sync::Arc};

use ::tracing::{info, warn};
use anyhow::{anyhow, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;
use rustls_pki_types::{pem::SliceIter, CertificateDer, PrivateKeyDer};

// This is required by certificate hot reload when using inotify, which is available only on linux
#[cfg(target_os = "linux")]
use tokio_stream::StreamExt;

use crate::config::TlsConfig;

/// There's no watching of the certificate files on non-linux platforms
/// since we rely on inotify to watch for changes
#[cfg(not(target_os = "linux"))]
pub(crate) async fn create_tls_config_and_watch_certificate_changes(
    tls_config: TlsConfig,
) -> Result<RustlsConfig> {
    let (cert, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await?;
    Ok(RustlsConfig::from_config(Arc::new(build_tls_server_config(cert, key)?)))
}

/// Return the RustlsConfig and watch for changes in the certificate files
/// using inotify.
/// When both the certificate and its key are changed, the RustlsConfig is reloaded,
/// causing the https server to use the new certificate.
#[cfg(target_os = "linux")]
pub(crate) async fn create_tls_config_and_watch_certificate_changes(
    tls_config: TlsConfig,
) -> Result<RustlsConfig> {
    use ::tracing::error;

    let (cert, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await?;
    let rust_config = RustlsConfig::from_config(Arc::new(build_tls_server_config(cert, key)?));
    let reloadable_rust_config = rust_config.clone();

    let inotify =
        inotify::Inotify::init().map_err(|e| anyhow!("Cannot initialize inotify: {e}"))?;
    let cert_watch = inotify
        .watches()
        .add(
            tls_config.cert_file.clone(),
            inotify::WatchMask::CLOSE_WRITE,
        )
        .map_err(|e| anyhow!("Cannot watch certificate file: {e}"))?;
    let key_watch = inotify
        .watches()
        .add(tls_config.key_file.clone(), inotify::WatchMask::CLOSE_WRITE)
        .map_err(|e| anyhow!("Cannot watch key file: {e}"))?;

    let buffer = [0; 1024];
    let stream = inotify
        .into_event_stream(buffer)
        .map_err(|e| anyhow!("Cannot create inotify event stream: {e}"))?;

    tokio::spawn(async move {
        tokio::pin!(stream);
        let mut cert_changed = false;
        let mut key_changed = false;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Cannot read inotify event: {e}");
                    continue;
                }
            };

            if event.wd == cert_watch {
                info!("TLS certificate file has been modified");
                cert_changed = true;
            }
            if event.wd == key_watch {
                info!("TLS key file has been modified");
                key_changed = true;
            }

            // the certificate and its key are rewritten one after the other, wait for both
            if !(key_changed && cert_changed) {
                continue;
            }
            cert_changed = false;
            key_changed = false;

            if let Err(e) = reload_server_config(&tls_config, &reloadable_rust_config).await {
                error!("Failed to reload TLS certificates, keeping the current ones: {e}");
            }
        }
    });

    Ok(rust_config)
}

#[cfg(target_os = "linux")]
async fn reload_server_config(tls_config: &TlsConfig, rustls_config: &RustlsConfig) -> Result<()> {
    info!("Reloading TLS certificates");
    let (cert, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await?;
    rustls_config.reload_from_config(Arc::new(build_tls_server_config(cert, key)?));

    Ok(())
}

// Build the TLS server
fn build_tls_server_config(
    cert: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    let mut server_config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(cert, key)?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(server_config)
}

// Load the server certificate and key
pub(crate) async fn load_server_cert_and_key(
    cert_file: &Path,
    key_file: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_contents = tokio::fs::read(cert_file)
        .await
        .map_err(|e| anyhow!("Error opening certificate file {}: {e}", cert_file.display()))?;
    let key_contents = tokio::fs::read(key_file)
        .await
        .map_err(|e| anyhow!("Error opening key file {}: {e}", key_file.display()))?;

    let cert_iterator: SliceIter<CertificateDer> = SliceIter::new(&cert_contents[..]);
    let certs: Vec<_> = cert_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse certificate: {e}");
            }
            it.ok()
        })
        .collect();

    if certs.is_empty() {
        return Err(anyhow!(
            "Expected at least one certificate in {}, found none",
            cert_file.display()
        ));
    }

    let key_iterator: SliceIter<PrivateKeyDer> = SliceIter::new(&key_contents[..]);
    let keys: Vec<PrivateKeyDer> = key_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse private key: {e}");
            }
            it.ok()
        })
        .collect();

    if keys.len() != 1 {
        return Err(anyhow!(
            "Expected exactly one key in key file, found {}",
            keys.len()
        ));
    }

    Ok((certs, keys[0].clone_key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use std::fs;
    use tempfile::tempdir;

    struct TlsData {
        cert: String,
        key: String,
    }

    fn create_cert(hostname: &str) -> TlsData {
        let key_pair = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec![hostname.to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        TlsData {
            cert: cert.pem(),
            key: key_pair.serialize_pem(),
        }
    }

    fn write_cert_and_key(dir: &Path) -> TlsConfig {
        let tls_data = create_cert("crd-deletion-guard.default.svc");

        let cert_file = dir.join("cert");
        let key_file = dir.join("key");
        fs::write(&cert_file, tls_data.cert).unwrap();
        fs::write(&key_file, tls_data.key).unwrap();

        TlsConfig {
            cert_file,
            key_file,
        }
    }

    #[tokio::test]
    async fn load_valid_cert_and_key() {
        let dir = tempdir().unwrap();
        let tls_config = write_cert_and_key(dir.path());

        let (certs, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file)
            .await
            .expect("cannot load certificate and key");

        assert_eq!(certs.len(), 1);
        build_tls_server_config(certs, key).expect("cannot build TLS config");
    }

    #[tokio::test]
    async fn missing_files_are_reported() {
        let dir = tempdir().unwrap();

        let result =
            load_server_cert_and_key(&dir.path().join("cert"), &dir.path().join("key")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn key_file_without_keys_is_rejected() {
        let dir = tempdir().unwrap();
        let tls_config = write_cert_and_key(dir.path());
        fs::write(&tls_config.key_file, "not a key").unwrap();

        let result = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_tls_config() {
        let dir = tempdir().unwrap();
        let tls_config = write_cert_and_key(dir.path());

        create_tls_config_and_watch_certificate_changes(tls_config)
            .await
            .expect("cannot create TLS config");
    }

    // Wait until the served configuration differs from `previous`, or give up
    #[cfg(target_os = "linux")]
    async fn wait_for_reload(rustls_config: &RustlsConfig, previous: &Arc<ServerConfig>) -> bool {
        for _ in 0..50 {
            if !Arc::ptr_eq(previous, &rustls_config.get_inner()) {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread")]
    async fn detect_certificate_rotation() {
        let dir = tempdir().unwrap();
        let tls_config = write_cert_and_key(dir.path());

        let rustls_config = create_tls_config_and_watch_certificate_changes(tls_config.clone())
            .await
            .expect("cannot create TLS config");
        let initial = rustls_config.get_inner();

        let tls_data = create_cert("cert2.example.com");

        // write only the cert file
        fs::write(&tls_config.cert_file, tls_data.cert).unwrap();

        // give inotify some time to detect the change
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        // the old certificate is still served, the key did not change yet
        assert!(Arc::ptr_eq(&initial, &rustls_config.get_inner()));

        // now write the key file
        fs::write(&tls_config.key_file, tls_data.key).unwrap();

        assert!(
            wait_for_reload(&rustls_config, &initial).await,
            "TLS configuration was not reloaded"
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_certificate_rotation_keeps_current_config() {
        let dir = tempdir().unwrap();
        let tls_config = write_cert_and_key(dir.path());

        let rustls_config = create_tls_config_and_watch_certificate_changes(tls_config.clone())
            .await
            .expect("cannot create TLS config");
        let initial = rustls_config.get_inner();

        fs::write(&tls_config.cert_file, "not a certificate").unwrap();
        fs::write(&tls_config.key_file, "not a key").unwrap();

        assert!(!wait_for_reload(&rustls_config, &initial).await);
    }
}

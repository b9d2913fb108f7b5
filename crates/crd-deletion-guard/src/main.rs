use std::process;

use anyhow::Result;
use crd_deletion_guard::{cli, config::Config, tracing::setup_tracing, CrdDeletionGuard};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;
    debug!("tracing system ready");

    // axum-server and kube pull in different rustls crypto backends, pick one
    // for the whole process before any TLS client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        fatal_error("cannot install the rustls crypto provider".to_owned());
    }

    let guard = match CrdDeletionGuard::new_from_config(config).await {
        Ok(guard) => guard,
        Err(e) => fatal_error(e.to_string()),
    };

    if let Err(e) = guard.run().await {
        fatal_error(format!("failed to start server: {e}"));
    }

    Ok(())
}

fn fatal_error(msg: String) -> ! {
    error!("{}", msg);
    process::exit(1);
}

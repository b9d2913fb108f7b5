use anyhow::{anyhow, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// The webhook always listens on this port
pub const PORT: u16 = 8443;

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub addr: SocketAddr,
    pub kubeconfig: Option<PathBuf>,
    pub tls_config: TlsConfig,
    pub crd_filter: CrdFilter,
    pub list_timeout: Duration,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Names of the CRDs whose deletion is guarded. An empty filter guards
/// every CRD.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrdFilter {
    names: BTreeSet<String>,
}

impl CrdFilter {
    pub fn new(names: BTreeSet<String>) -> Self {
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether the existence check has to be run for the CRD with the given name
    pub fn should_check(&self, name: &str) -> bool {
        self.is_empty() || self.names.contains(name)
    }
}

impl FromIterator<String> for CrdFilter {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let kubeconfig = matches
            .get_one::<String>("kubeconfig")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let tls_config = tls_files(matches)?;

        let crd_filter = matches
            .get_many::<String>("crds")
            .unwrap_or_default()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect();

        let list_timeout = Duration::from_secs(
            *matches
                .get_one::<u64>("list-timeout")
                .expect("clap should have set a default value"),
        );

        let log_debug = matches
            .get_one::<bool>("log-debug")
            .expect("clap should have set a default value")
            .to_owned();
        let log_level = if log_debug {
            "debug".to_owned()
        } else {
            matches
                .get_one::<String>("log-level")
                .expect("This should not happen, there's a default value for log-level")
                .to_owned()
        };
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("This should not happen, there's a default value for log-fmt")
            .to_owned();
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();

        Ok(Self {
            addr,
            kubeconfig,
            tls_config,
            crd_filter,
            list_timeout,
            log_level,
            log_fmt,
            log_no_color,
        })
    }
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    let address = matches
        .get_one::<String>("address")
        .expect("This should not happen, there's a default value for address");
    let ip: IpAddr = address
        .parse()
        .map_err(|e| anyhow!("error parsing arguments: invalid bind address {address}: {e}"))?;

    Ok(SocketAddr::new(ip, PORT))
}

fn tls_files(matches: &ArgMatches) -> Result<TlsConfig> {
    let cert_file = matches
        .get_one::<String>("cert-file")
        .expect("This should not happen, there's a default value for cert-file");
    let key_file = matches
        .get_one::<String>("key-file")
        .expect("This should not happen, there's a default value for key-file");
    if cert_file.is_empty() || key_file.is_empty() {
        return Err(anyhow!(
            "error parsing arguments: both --cert-file and --key-file must be provided"
        ));
    }

    Ok(TlsConfig {
        cert_file: PathBuf::from(cert_file),
        key_file: PathBuf::from(key_file),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;
    use rstest::*;

    fn config_from(args: &[&str]) -> Result<Config> {
        let matches = build_cli()
            .try_get_matches_from(std::iter::once("crd-deletion-guard").chain(args.iter().copied()))
            .expect("cannot parse command line");
        Config::from_args(&matches)
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).expect("cannot build config");

        assert_eq!(config.addr, SocketAddr::from(([0, 0, 0, 0], PORT)));
        assert!(config.kubeconfig.is_none());
        assert_eq!(config.tls_config.cert_file, PathBuf::from("/cert/cert"));
        assert_eq!(config.tls_config.key_file, PathBuf::from("/cert/key"));
        assert!(config.crd_filter.is_empty());
        assert_eq!(config.list_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn repeated_crds_build_the_filter() {
        let config = config_from(&[
            "--crds",
            "widgets.example.com",
            "--crds",
            "prometheuses.monitoring.coreos.com",
        ])
        .expect("cannot build config");

        assert!(config.crd_filter.should_check("widgets.example.com"));
        assert!(config
            .crd_filter
            .should_check("prometheuses.monitoring.coreos.com"));
        assert!(!config.crd_filter.should_check("gadgets.example.com"));
    }

    #[rstest]
    #[case::debug_toggle(&["--log-debug"], "debug")]
    #[case::debug_toggle_wins(&["--log-level", "warn", "--log-debug"], "debug")]
    #[case::explicit_level(&["--log-level", "warn"], "warn")]
    fn log_level(#[case] args: &[&str], #[case] expected: &str) {
        let config = config_from(args).expect("cannot build config");

        assert_eq!(config.log_level, expected);
    }

    #[test]
    fn kubeconfig_path() {
        let config = config_from(&["--kubeconfig", "/tmp/kubeconfig"]).expect("cannot build config");

        assert_eq!(config.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
    }

    #[test]
    fn empty_tls_files_are_rejected() {
        assert!(config_from(&["--cert-file", ""]).is_err());
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        assert!(config_from(&["--addr", "not-an-ip"]).is_err());
    }

    #[test]
    fn empty_filter_checks_everything() {
        let filter = CrdFilter::default();

        assert!(filter.should_check("anything.example.com"));
    }
}

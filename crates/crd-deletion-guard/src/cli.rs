use clap::builder::PossibleValue;
use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    let mut args = vec![
            Arg::new("log-level")
                .long("log-level")
                .value_name("LOG_LEVEL")
                .env("CRD_GUARD_LOG_LEVEL")
                .default_value("info")
                .value_parser([
                    PossibleValue::new("trace"),
                    PossibleValue::new("debug"),
                    PossibleValue::new("info"),
                    PossibleValue::new("warn"),
                    PossibleValue::new("error"),
                ])
                .help("Log level"),
            Arg::new("log-debug")
                .long("log-debug")
                .env("CRD_GUARD_LOG_DEBUG")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging, takes precedence over --log-level"),
            Arg::new("log-fmt")
                .long("log-fmt")
                .value_name("LOG_FMT")
                .env("CRD_GUARD_LOG_FMT")
                .default_value("text")
                .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
                .help("Log output format"),
            Arg::new("log-no-color")
                .long("log-no-color")
                .env("NO_COLOR")
                .action(ArgAction::SetTrue)
                .help("Disable colored output for logs"),
            Arg::new("address")
                .long("addr")
                .value_name("BIND_ADDRESS")
                .default_value("0.0.0.0")
                .env("CRD_GUARD_BIND_ADDRESS")
                .help("Bind against ADDRESS, the port is always 8443"),
            Arg::new("kubeconfig")
                .long("kubeconfig")
                .value_name("KUBECONFIG")
                .default_value("")
                .env("CRD_GUARD_KUBECONFIG")
                .help("Path to kubeconfig file: e.g. ~/.kube/kind-config-kind. Leave empty when running inside of the cluster"),
            Arg::new("cert-file")
                .long("cert-file")
                .value_name("CERT_FILE")
                .default_value("/cert/cert")
                .env("CRD_GUARD_CERT_FILE")
                .help("Path to an X.509 certificate file for HTTPS"),
            Arg::new("key-file")
                .long("key-file")
                .value_name("KEY_FILE")
                .default_value("/cert/key")
                .env("CRD_GUARD_KEY_FILE")
                .help("Path to an X.509 private key file for HTTPS"),
            Arg::new("crds")
                .long("crds")
                .value_name("CRD_NAME")
                .env("CRD_GUARD_CRDS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .help("Name of a CRD to block the deletion of, can be repeated. All the CRDs are protected when omitted. e.g. 'prometheuses.monitoring.coreos.com'"),
            Arg::new("list-timeout")
                .long("list-timeout")
                .value_name("SECONDS")
                .env("CRD_GUARD_LIST_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Deny the deletion when the search for existing instances takes longer than SECONDS"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}

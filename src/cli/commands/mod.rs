use crate::built_info;
use clap::{
    Arg, ArgAction, Command,
    builder::{
        ValueParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

fn version() -> &'static str {
    let version = match built_info::GIT_COMMIT_HASH_SHORT {
        Some(hash) => format!("{} - {hash}", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    Box::leak(version.into_boxed_str())
}

fn validator_url() -> ValueParser {
    ValueParser::from(move |s: &str| -> Result<String, String> {
        url::Url::parse(s)
            .map_err(|e| format!("invalid URL '{s}': {e}"))
            .and_then(|url| match url.scheme() {
                "http" | "https" => Ok(s.to_string()),
                scheme => Err(format!("unsupported URL scheme '{scheme}'")),
            })
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("ams_datasource")
        .about("Ambari Metrics data source for dashboards")
        .version(version())
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .env("AMS_DATASOURCE_PORT")
                .default_value("9400")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("IP address to bind to [default: [::]:port, falls back to 0.0.0.0:port]")
                .env("AMS_DATASOURCE_LISTEN"),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .help("Base URL of the Ambari Metrics collector")
                .env("AMS_DATASOURCE_URL")
                .default_value("http://localhost:6188")
                .value_parser(validator_url()),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .help("Data source name used in logs")
                .env("AMS_DATASOURCE_NAME")
                .default_value("ambari-metrics"),
        )
        .arg(
            Arg::new("basic-auth-user")
                .long("basic-auth-user")
                .help("User for basic authentication against the collector")
                .env("AMS_DATASOURCE_BASIC_AUTH_USER"),
        )
        .arg(
            Arg::new("basic-auth-password")
                .long("basic-auth-password")
                .help("Password for basic authentication against the collector")
                .env("AMS_DATASOURCE_BASIC_AUTH_PASSWORD")
                .hide_env_values(true)
                .requires("basic-auth-user"),
        )
        .arg(
            Arg::new("with-credentials")
                .long("with-credentials")
                .help("Allow browsers to send credentials with cross-origin requests")
                .env("AMS_DATASOURCE_WITH_CREDENTIALS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Timeout in seconds for each collector request")
                .env("AMS_DATASOURCE_TIMEOUT")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("metadata-refresh-interval")
                .long("metadata-refresh-interval")
                .help("Seconds between metadata refreshes, 0 fetches once at startup")
                .env("AMS_DATASOURCE_METADATA_REFRESH_INTERVAL")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("partial-results")
                .long("partial-results")
                .help("Return empty series for failed targets instead of failing the query")
                .env("AMS_DATASOURCE_PARTIAL_RESULTS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vvv for debug")
                .action(ArgAction::Count),
        )
}

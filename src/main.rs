use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use leadmaker::config::{config_schema, load_config, ConfigOverrides};
use leadmaker::http::{ApiClient, RequestBody, RequestOptions};
use leadmaker::metrics::Metrics;
use leadmaker::utils::logger::init_logging;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};

/// Command-line access to the Leadmaker partner API.
#[derive(Parser, Debug)]
#[command(name = "leadmaker", version, about)]
struct Cli {
    #[arg(
        long,
        env = "LEADMAKER_CONFIG",
        default_value = "./config.yaml",
        help = "Configuration file path"
    )]
    config: PathBuf,

    #[arg(long, help = "Override the API base URL")]
    base_url: Option<String>,

    #[arg(
        long,
        env = "LEADMAKER_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Access token, stored under the configured access cookie name"
    )]
    access_token: Option<String>,

    #[arg(
        long,
        env = "LEADMAKER_REFRESH_TOKEN",
        hide_env_values = true,
        help = "Refresh token, stored under the configured refresh cookie name"
    )]
    refresh_token: Option<String>,

    #[arg(
        long = "cookie",
        value_parser = parse_cookie,
        help = "Extra session cookie as 'NAME=VALUE', repeatable"
    )]
    cookies: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configuration JSON schema and exit
    Schema,
    Get(RequestArgs),
    Post(BodyRequestArgs),
    Put(BodyRequestArgs),
    Patch(BodyRequestArgs),
    Delete(RequestArgs),
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Path relative to the base URL, e.g. /api/v2/threads
    path: String,

    #[arg(long, help = "Do not refresh the session on 401/422")]
    no_retry: bool,

    #[arg(
        short = 'H',
        long = "header",
        value_parser = parse_header,
        help = "Extra header as 'Name: value'"
    )]
    headers: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
struct BodyRequestArgs {
    #[command(flatten)]
    request: RequestArgs,

    #[arg(short, long, help = "JSON request body")]
    data: Option<String>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))
}

fn parse_cookie(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected 'NAME=VALUE', got '{}'", raw)),
    }
}

fn parse_body(data: Option<String>) -> Result<RequestBody, String> {
    match data {
        None => Ok(RequestBody::Empty),
        Some(raw) => serde_json::from_str::<Value>(&raw)
            .map(RequestBody::Json)
            .map_err(|e| format!("--data is not valid JSON: {}", e)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Command::Schema = cli.command {
        println!("{}", config_schema());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let client_config = config.client.clone().with_overrides(ConfigOverrides {
        base_url: cli.base_url.clone(),
        ..ConfigOverrides::default()
    });

    let metrics = if config.metrics.enabled {
        match Metrics::new() {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                error!("Failed to register metrics: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut builder = ApiClient::builder(client_config)
        .session_tokens(cli.access_token.clone(), cli.refresh_token.clone());
    for (name, value) in cli.cookies.clone() {
        builder = builder.cookie(name, value);
    }
    if let Some(metrics) = metrics.clone() {
        builder = builder.metrics(metrics);
    }
    let client = match builder.build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut redirects = client.subscribe_redirects();

    let (method, args, body) = match cli.command {
        // printed before the configuration was loaded
        Command::Schema => return ExitCode::SUCCESS,
        Command::Get(args) => (Method::GET, args, Ok(RequestBody::Empty)),
        Command::Delete(args) => (Method::DELETE, args, Ok(RequestBody::Empty)),
        Command::Post(args) => (Method::POST, args.request, parse_body(args.data)),
        Command::Put(args) => (Method::PUT, args.request, parse_body(args.data)),
        Command::Patch(args) => (Method::PATCH, args.request, parse_body(args.data)),
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let opts = args
        .headers
        .into_iter()
        .fold(RequestOptions::new().retry_on_401(!args.no_retry), |opts, (name, value)| {
            opts.header(name, value)
        });

    let response = match client.request(method, &args.path, body, opts).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Request failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // the default navigator publishes before the response is handed back
    while let Ok(destination) = redirects.try_recv() {
        eprintln!("session expired: redirect to {}", destination);
    }

    println!("{}", response.status);
    match &response.data {
        Value::Null => {}
        Value::String(text) => println!("{}", text),
        data => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
    }

    if let Some(metrics) = metrics {
        debug!("metrics:\n{}", metrics.render());
    }

    if response.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

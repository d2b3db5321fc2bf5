use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use lambdefy::generate::{generate, simulate_response, Target};
use lambdefy::{resolve_and_generate, Method, RawConfig};

#[derive(Parser)]
#[command(name = "lambdefy")]
#[command(version, about = "Generate catch-all API gateway endpoints for a function", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by LAMBDEFY_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate endpoints and replace them in the function's s-function file
    Generate {
        /// Project directory to search for the function carrying custom.lambdefy
        #[arg(short, long, conflicts_with = "file")]
        project_root: Option<PathBuf>,

        /// Explicit s-function.{json,yaml,toml} file (default: the one in the current directory)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Select the function by name instead of by its custom.lambdefy attribute
        #[arg(short, long, requires = "project_root")]
        name: Option<String>,

        /// Resolve and report without writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Print the endpoints an option table generates
    Preview {
        /// Option table as JSON, in custom.lambdefy form
        #[arg(short, long, default_value = "{}")]
        config: String,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Show the response the gateway would build from a function's answer
    Simulate {
        /// Option table as JSON, in custom.lambdefy form
        #[arg(short, long, default_value = "{}")]
        config: String,

        /// Status the function reports
        #[arg(short, long)]
        status: u16,

        /// Response body
        #[arg(short, long, default_value = "")]
        body: String,

        /// Response header as NAME=VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Serve the tools over JSON-RPC on stdin/stdout
    Serve,
}

/// Request-time overrides layered over the stored option table.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    #[arg(long)]
    max_depth: Option<u32>,

    /// HTTP method to add (repeatable)
    #[arg(long = "method")]
    methods: Vec<Method>,

    /// Request header to forward (repeatable)
    #[arg(long = "request-header")]
    request_headers: Vec<String>,

    /// Response header to surface (repeatable)
    #[arg(long = "response-header")]
    response_headers: Vec<String>,

    /// Status code to map (repeatable)
    #[arg(long = "status-code")]
    status_codes: Vec<u16>,

    #[arg(long, default_value_t = false)]
    no_default_methods: bool,

    #[arg(long, default_value_t = false)]
    no_default_request_headers: bool,

    #[arg(long, default_value_t = false)]
    no_default_response_headers: bool,

    #[arg(long, default_value_t = false)]
    no_default_status_codes: bool,
}

impl OverrideArgs {
    fn to_raw(&self) -> RawConfig {
        fn list<T: serde::Serialize>(items: &[T]) -> Option<Value> {
            (!items.is_empty()).then(|| json!(items))
        }
        fn opt_out(flag: bool) -> Option<bool> {
            flag.then_some(false)
        }

        RawConfig {
            max_depth: self.max_depth.map(|d| json!(d)),
            methods: list(&self.methods),
            request_headers: list(&self.request_headers),
            response_headers: list(&self.response_headers),
            status_codes: list(&self.status_codes),
            default_methods: opt_out(self.no_default_methods),
            default_request_headers: opt_out(self.no_default_request_headers),
            default_response_headers: opt_out(self.no_default_response_headers),
            default_status_codes: opt_out(self.no_default_status_codes),
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    Ok((name.trim().to_string(), value.to_string()))
}

fn parse_config(raw: &str) -> Result<RawConfig> {
    let value: Value = serde_json::from_str(raw).context("Parsing --config JSON")?;
    Ok(RawConfig::from_value(value)?)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("LAMBDEFY_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate { project_root, file, name, dry_run, overrides } => {
            let target = match (project_root, file) {
                (Some(root), _) => Target::Project { root, name },
                (None, Some(file)) => Target::File(file),
                (None, None) => {
                    let cwd = std::env::current_dir().context("Resolving current directory")?;
                    Target::File(lambdefy::gateway::project::function_in_dir(&cwd)?)
                }
            };
            print_json(&generate(&target, &overrides.to_raw(), dry_run)?)
        }
        Commands::Preview { config, overrides } => {
            let raw = parse_config(&config)?.overlay(&overrides.to_raw());
            print_json(&resolve_and_generate(&raw)?)
        }
        Commands::Simulate { config, status, body, headers } => {
            let headers: BTreeMap<String, String> = headers.into_iter().collect();
            print_json(&simulate_response(&parse_config(&config)?, status, &body, &headers)?)
        }
        Commands::Serve => {
            let stdin = std::io::stdin();
            lambdefy::server::serve(stdin.lock(), std::io::stdout().lock())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_parses_overrides() {
        let cli = Cli::try_parse_from([
            "lambdefy", "generate", "--project-root", "proj", "--name", "app",
            "--max-depth", "2", "--method", "POST", "--method", "PUT",
            "--status-code", "201", "--no-default-status-codes", "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate { project_root, name, dry_run, overrides, .. } => {
                assert_eq!(project_root, Some(PathBuf::from("proj")));
                assert_eq!(name.as_deref(), Some("app"));
                assert!(dry_run);
                let raw = overrides.to_raw();
                assert_eq!(raw.max_depth, Some(json!(2)));
                assert_eq!(raw.methods, Some(json!(["POST", "PUT"])));
                assert_eq!(raw.status_codes, Some(json!([201])));
                assert_eq!(raw.default_status_codes, Some(false));
                assert_eq!(raw.default_methods, None);
                assert!(raw.request_headers.is_none());
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn unknown_method_flag_is_rejected() {
        assert!(Cli::try_parse_from(["lambdefy", "preview", "--method", "TRACE"]).is_err());
    }

    #[test]
    fn project_root_and_file_conflict() {
        assert!(Cli::try_parse_from(["lambdefy", "generate", "-p", "a", "-f", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["lambdefy", "generate", "--name", "app"]).is_err());
    }

    #[test]
    fn simulate_parses_headers() {
        let cli = Cli::try_parse_from([
            "lambdefy", "simulate", "--status", "404", "--body", "gone", "--header", "ETag=abc", "--header", "Date=today",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate { status, headers, .. } => {
                assert_eq!(status, 404);
                assert_eq!(headers, vec![("ETag".to_string(), "abc".to_string()), ("Date".to_string(), "today".to_string())]);
            }
            _ => panic!("Expected Simulate command"),
        }
        assert!(Cli::try_parse_from(["lambdefy", "simulate", "--status", "404", "--header", "bad"]).is_err());
    }

    #[test]
    fn empty_overrides_leave_stored_table_alone() {
        assert!(OverrideArgs::default().to_raw().is_empty());
    }

    #[test]
    fn config_must_be_an_object() {
        assert!(parse_config("{\"maxDepth\": 1}").is_ok());
        assert!(parse_config("[1]").is_err());
        assert!(parse_config("not json").is_err());
    }
}

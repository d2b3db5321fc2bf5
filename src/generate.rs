//! One generation run: read the stored options, layer request-time
//! overrides, generate, and replace the function's endpoints.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::gateway::endpoint::{EndpointBuilder, EndpointDescriptor};
use crate::gateway::options::{Options, RawConfig};
use crate::gateway::project::find_application;
use crate::gateway::response::{encode_payload, simulate, ErrorPayload, SimulatedResponse};
use crate::gateway::store::FunctionFile;
use crate::gateway::{ConfigSink, ConfigSource};

/// Which function config a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Project { root: PathBuf, name: Option<String> },
}

impl Target {
    pub fn open(&self) -> Result<FunctionFile> {
        match self {
            Target::File(path) => FunctionFile::load(path),
            Target::Project { root, name } => find_application(root, name.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub file:      PathBuf,
    pub function:  Option<String>,
    pub replaced:  usize,
    pub endpoints: usize,
    pub dry_run:   bool,
    pub options:   Options,
}

/// Resolve and generate against any source/sink pair. Nothing is written when
/// `dry_run` is set or when resolution fails.
pub fn apply<S>(store: &mut S, overrides: &RawConfig, dry_run: bool) -> Result<(Options, Vec<EndpointDescriptor>)>
where
    S: ConfigSource + ConfigSink,
{
    let raw = store.custom_config()?.overlay(overrides);
    let options = Options::resolve(&raw)?;
    let endpoints = EndpointBuilder::new(&options).build();
    if !dry_run {
        store.replace_endpoints(&endpoints)?;
    }
    Ok((options, endpoints))
}

pub fn generate(target: &Target, overrides: &RawConfig, dry_run: bool) -> Result<GenerateReport> {
    let mut file = target.open()?;
    let replaced = file.endpoint_count();
    let (options, endpoints) = apply(&mut file, overrides, dry_run)
        .with_context(|| format!("Generating endpoints for {}", file.path().display()))?;

    info!(
        file = %file.path().display(),
        endpoints = endpoints.len(),
        dry_run,
        "generated endpoints"
    );

    Ok(GenerateReport {
        file: file.path().to_path_buf(),
        function: file.name().map(str::to_string),
        replaced,
        endpoints: endpoints.len(),
        dry_run,
        options,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub payload:  ErrorPayload,
    pub response: SimulatedResponse,
}

/// Encode what the function would return for `status` and run it through the
/// generated response rules.
pub fn simulate_response(
    raw: &RawConfig,
    status: u16,
    body: &str,
    headers: &BTreeMap<String, String>,
) -> Result<SimulationReport> {
    let options = Options::resolve(raw)?;
    let builder = EndpointBuilder::new(&options);
    let payload = encode_payload(status, body, headers, options.response_headers());
    let response = simulate(builder.responses(), &payload)?;
    Ok(SimulationReport { payload, response })
}

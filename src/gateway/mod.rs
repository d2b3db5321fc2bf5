pub mod coalesce;
pub mod endpoint;
pub mod error;
pub mod options;
pub mod project;
pub mod response;
pub mod store;

use anyhow::Result;

use crate::gateway::endpoint::{EndpointBuilder, EndpointDescriptor};
use crate::gateway::error::OptionError;
use crate::gateway::options::{Options, RawConfig};

/// Where the stored `custom.lambdefy` table of a function comes from.
pub trait ConfigSource {
    fn custom_config(&self) -> Result<RawConfig>;
}

/// Where generated endpoints go. Any previous list is replaced in full.
pub trait ConfigSink {
    fn replace_endpoints(&mut self, endpoints: &[EndpointDescriptor]) -> Result<()>;
}

/// Resolve a raw option table and expand it into endpoint descriptors.
/// Pure: the same input always yields the same list.
pub fn resolve_and_generate(raw: &RawConfig) -> Result<Vec<EndpointDescriptor>, OptionError> {
    let options = Options::resolve(raw)?;
    Ok(EndpointBuilder::new(&options).build())
}

//! Catch-all API gateway endpoint generation for a single backing function.
//!
//! [`resolve_and_generate`] is the pure core. [`generate::generate`] wires it
//! to a function's `s-function` file, and [`server::serve`] exposes the same
//! operations as JSON-RPC tools.

pub mod gateway;
pub mod generate;
pub mod server;

pub use gateway::endpoint::EndpointDescriptor;
pub use gateway::error::OptionError;
pub use gateway::options::{Method, Options, RawConfig};
pub use gateway::resolve_and_generate;

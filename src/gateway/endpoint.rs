//! # Endpoint Generator
//!
//! Expands resolved [`Options`] into the catch-all endpoint list for one
//! function: every method at `/`, `/{p0}`, `/{p0}/{p1}`, … down to
//! `maxDepth`, all pointing at the same integration.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::gateway::options::{Method, Options};
use crate::gateway::response::{
    build_responses, response_parameters, sorted_headers, ResponseTable, JSON_CONTENT_TYPE,
};

pub const INTEGRATION_TYPE: &str = "AWS";
pub const AUTHORIZATION_NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub path:               String,
    pub method:             Method,
    #[serde(rename = "type")]
    pub integration_type:   String,
    pub authorization_type: String,
    pub authorizer_function: bool,
    pub api_key_required:   bool,
    pub request_parameters: BTreeMap<String, String>,
    pub request_templates:  BTreeMap<String, String>,
    /// One table shared by every descriptor of a run.
    pub responses:          Arc<ResponseTable>,
}

/// Path template at `depth`: `/` for the root, then one `{pN}` segment per level.
pub fn path_template(depth: u32) -> String {
    let segments: Vec<String> = (0..depth).map(|d| format!("{{p{d}}}")).collect();
    format!("/{}", segments.join("/"))
}

/// `integration.request.header.<H>` → `method.request.header.<H>`.
pub fn request_parameters(headers: &[String]) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|h| {
            (
                format!("integration.request.header.{h}"),
                format!("method.request.header.{h}"),
            )
        })
        .collect()
}

/// VTL mapping template that hands the whole request to the function as one
/// JSON document. `response_headers` must already be in slot order.
pub fn request_template(response_headers: &[String]) -> String {
    let lowered: Vec<String> = response_headers.iter().map(|h| h.to_lowercase()).collect();
    let response_headers = serde_json::to_string(&lowered).unwrap_or_else(|_| "[]".to_string());

    let mut out = String::from("{\n");
    out.push_str("  \"method\": \"$context.httpMethod\",\n");
    out.push_str("  \"body\": $input.json('$'),\n");
    for (name, source) in [("headers", "header"), ("query", "querystring"), ("path", "path")] {
        out.push_str(&format!("  \"{name}\": {{\n"));
        out.push_str(&format!("    #foreach($param in $input.params().{source}.keySet())\n"));
        out.push_str(&format!(
            "    \"$param\": \"$util.escapeJavaScript($input.params().{source}.get($param))\" #if($foreach.hasNext),#end\n"
        ));
        out.push_str("    #end\n");
        out.push_str("  },\n");
    }
    out.push_str(&format!("  \"responseHeaders\": {response_headers}\n"));
    out.push('}');
    out
}

/// Precomputes everything shared across descriptors, then stamps them out.
pub struct EndpointBuilder<'a> {
    options:            &'a Options,
    request_parameters: BTreeMap<String, String>,
    request_template:   String,
    responses:          Arc<ResponseTable>,
}

impl<'a> EndpointBuilder<'a> {
    pub fn new(options: &'a Options) -> Self {
        let sorted = sorted_headers(options.response_headers());
        let responses = build_responses(options.status_codes(), &response_parameters(&sorted));

        EndpointBuilder {
            options,
            request_parameters: request_parameters(options.request_headers()),
            request_template: request_template(&sorted),
            responses: Arc::new(responses),
        }
    }

    /// (maxDepth + 1) × |methods| descriptors, depth-major, methods in
    /// resolution order.
    pub fn build(&self) -> Vec<EndpointDescriptor> {
        let methods = self.options.methods();
        let mut endpoints = Vec::with_capacity((self.options.max_depth() as usize + 1) * methods.len());
        for depth in 0..=self.options.max_depth() {
            let path = path_template(depth);
            for method in methods {
                endpoints.push(self.endpoint(&path, *method));
            }
        }
        endpoints
    }

    pub fn responses(&self) -> &Arc<ResponseTable> {
        &self.responses
    }

    fn endpoint(&self, path: &str, method: Method) -> EndpointDescriptor {
        EndpointDescriptor {
            path:                path.to_string(),
            method,
            integration_type:    INTEGRATION_TYPE.to_string(),
            authorization_type:  AUTHORIZATION_NONE.to_string(),
            authorizer_function: false,
            api_key_required:    false,
            request_parameters:  self.request_parameters.clone(),
            request_templates:   BTreeMap::from([(
                JSON_CONTENT_TYPE.to_string(),
                self.request_template.clone(),
            )]),
            responses:           Arc::clone(&self.responses),
        }
    }
}

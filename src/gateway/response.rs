//! Response rules shared by every generated endpoint, and an offline
//! simulation of how the gateway applies them to a function's error payload.
//!
//! The backing function answers with an error-shaped payload:
//!
//! ```text
//! { "errorMessage": "404", "stackTrace": [ base64(body), <header 1>, <header 2>, … ] }
//! ```
//!
//! `errorMessage` selects the rule, slot 0 carries the body and slot `i + 1`
//! carries the value of the response header at sorted position `i`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::gateway::options::FALLBACK_STATUS;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Key of the catch-all rule.
pub const DEFAULT_RULE: &str = "default";

pub const BODY_TEMPLATE: &str = "$util.base64Decode($input.path('$.stackTrace[0]'))";

const HEADER_TARGET_PREFIX: &str = "method.response.header.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    pub status_code:         String,
    pub response_parameters: BTreeMap<String, String>,
    pub response_templates:  BTreeMap<String, String>,
}

/// Rules keyed by selection pattern (the exact status code) or [`DEFAULT_RULE`].
pub type ResponseTable = BTreeMap<String, ResponseRule>;

/// Response headers in the order that fixes their payload slots.
pub fn sorted_headers(headers: &[String]) -> Vec<String> {
    let mut sorted = headers.to_vec();
    sorted.sort();
    sorted
}

/// Payload slot carrying the header at sorted position `position`.
pub fn header_slot(position: usize) -> usize {
    position + 1
}

/// `method.response.header.<H>` → `integration.response.body.stackTrace[<slot>]`.
pub fn response_parameters(sorted: &[String]) -> BTreeMap<String, String> {
    sorted
        .iter()
        .enumerate()
        .map(|(i, header)| {
            (
                format!("{HEADER_TARGET_PREFIX}{header}"),
                format!("integration.response.body.stackTrace[{}]", header_slot(i)),
            )
        })
        .collect()
}

pub fn rule_key(code: u16) -> String {
    if code == FALLBACK_STATUS {
        DEFAULT_RULE.to_string()
    } else {
        code.to_string()
    }
}

pub fn build_responses(status_codes: &[u16], parameters: &BTreeMap<String, String>) -> ResponseTable {
    status_codes
        .iter()
        .map(|code| {
            let rule = ResponseRule {
                status_code:         code.to_string(),
                response_parameters: parameters.clone(),
                response_templates:  BTreeMap::from([(
                    JSON_CONTENT_TYPE.to_string(),
                    BODY_TEMPLATE.to_string(),
                )]),
            };
            (rule_key(*code), rule)
        })
        .collect()
}

// ─── Simulation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_message: String,
    #[serde(default)]
    pub stack_trace:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedResponse {
    pub rule:        String,
    pub status_code: u16,
    pub body:        String,
    pub headers:     BTreeMap<String, String>,
}

/// Build the payload a backing function should return for `status`.
/// Header names are matched case-insensitively; headers it does not set get an
/// empty slot so later positions stay aligned.
pub fn encode_payload(
    status: u16,
    body: &str,
    headers: &BTreeMap<String, String>,
    response_headers: &[String],
) -> ErrorPayload {
    let mut stack_trace = vec![STANDARD.encode(body)];
    for header in sorted_headers(response_headers) {
        let value = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&header))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        stack_trace.push(value);
    }
    ErrorPayload {
        error_message: status.to_string(),
        stack_trace,
    }
}

fn slot_pattern() -> &'static Regex {
    static SLOT: OnceLock<Regex> = OnceLock::new();
    SLOT.get_or_init(|| {
        Regex::new(r"^integration\.response\.body\.stackTrace\[(\d+)\]$").expect("static regex")
    })
}

/// Pick the rule whose selection pattern fully matches `errorMessage`,
/// falling back to [`DEFAULT_RULE`].
pub fn select_rule<'a>(table: &'a ResponseTable, error_message: &str) -> Result<(&'a str, &'a ResponseRule)> {
    for (key, rule) in table {
        if key == DEFAULT_RULE {
            continue;
        }
        let pattern = Regex::new(&format!("^(?:{key})$"))
            .with_context(|| format!("Invalid selection pattern '{}'", key))?;
        if pattern.is_match(error_message) {
            return Ok((key.as_str(), rule));
        }
    }
    table
        .get_key_value(DEFAULT_RULE)
        .map(|(k, r)| (k.as_str(), r))
        .context("No rule matched and the table has no default rule")
}

/// Apply the table to a payload the way the gateway would.
pub fn simulate(table: &ResponseTable, payload: &ErrorPayload) -> Result<SimulatedResponse> {
    let (key, rule) = select_rule(table, &payload.error_message)?;

    let template = rule
        .response_templates
        .get(JSON_CONTENT_TYPE)
        .context("Rule has no application/json template")?;
    if template != BODY_TEMPLATE {
        bail!("Unsupported response template: {}", template);
    }

    let body = match payload.stack_trace.first() {
        Some(encoded) => {
            let bytes = STANDARD
                .decode(encoded)
                .context("Decoding base64 body from stackTrace[0]")?;
            String::from_utf8(bytes).context("Body is not valid UTF-8")?
        }
        None => String::new(),
    };

    let mut headers = BTreeMap::new();
    for (target, source) in &rule.response_parameters {
        let Some(name) = target.strip_prefix(HEADER_TARGET_PREFIX) else {
            continue;
        };
        let slot: usize = slot_pattern()
            .captures(source)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .with_context(|| format!("Unrecognised response parameter source '{}'", source))?;
        // The gateway leaves a header unset when its slot is missing.
        if let Some(value) = payload.stack_trace.get(slot) {
            headers.insert(name.to_string(), value.clone());
        }
    }

    Ok(SimulatedResponse {
        rule:        key.to_string(),
        status_code: rule.status_code.parse().context("Rule status code is not numeric")?,
        body,
        headers,
    })
}

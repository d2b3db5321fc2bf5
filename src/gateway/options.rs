//! # Option Resolver
//!
//! Turns the sparse `custom.lambdefy` table of a function into a fully
//! populated, validated [`Options`] value.
//!
//! Each of the five option families is resolved on its own with the same
//! opt-out/union rule (see [`coalesce`]): start from the hard defaults unless
//! the family's `default*` flag is an explicit `false`, then union in whatever
//! the user listed. The first violation aborts resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::gateway::coalesce::{coalesce, string_entry};
use crate::gateway::error::OptionError;

pub const DEFAULT_MAX_DEPTH: u32 = 0;
pub const DEFAULT_METHODS: &[Method] = &[Method::Get];
pub const DEFAULT_REQUEST_HEADERS: &[&str] = &[];
pub const DEFAULT_RESPONSE_HEADERS: &[&str] =
    &["Connection", "Content-Length", "Content-Type", "Date", "ETag"];
pub const DEFAULT_STATUS_CODES: &[u16] = &[200, 404, 500];

/// Status code answered by the catch-all response rule. Always present.
pub const FALLBACK_STATUS: u16 = 500;

const MIN_STATUS: i64 = 200;
const MAX_STATUS: i64 = 599;

// ─── Methods ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
        Method::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get     => "GET",
            Method::Post    => "POST",
            Method::Put     => "PUT",
            Method::Delete  => "DELETE",
            Method::Patch   => "PATCH",
            Method::Head    => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = OptionError;

    /// Tokens are matched case-sensitively, the way the gateway spells them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let supported: Vec<&str> = Method::ALL.iter().map(Method::as_str).collect();
                OptionError::invalid(format!(
                    "invalid method {s}; supported values are {}",
                    supported.join(", ")
                ))
            })
    }
}

// ─── Raw input ───────────────────────────────────────────────────────────────

/// The unvalidated option table as stored under `custom.lambdefy`.
///
/// Option values are kept as raw JSON so the resolver can report type errors
/// as [`OptionError::InvalidOption`]. A key explicitly set to `null` counts as
/// present (and is rejected), which is why these fields go through [`present`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub methods: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_methods: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_request_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_response_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_status_codes: Option<bool>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl RawConfig {
    /// Parse a raw table. Unknown keys are ignored; a non-boolean opt-out flag
    /// is an invalid option.
    pub fn from_value(value: Value) -> Result<Self, OptionError> {
        if !value.is_object() {
            return Err(OptionError::invalid(format!(
                "lambdefy attribute must be an object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| OptionError::invalid(e.to_string()))
    }

    /// Layer request-time overrides on top of the stored table. Any key set in
    /// `overrides` wins.
    pub fn overlay(&self, overrides: &RawConfig) -> RawConfig {
        RawConfig {
            max_depth: overrides.max_depth.clone().or_else(|| self.max_depth.clone()),
            methods: overrides.methods.clone().or_else(|| self.methods.clone()),
            request_headers: overrides
                .request_headers
                .clone()
                .or_else(|| self.request_headers.clone()),
            response_headers: overrides
                .response_headers
                .clone()
                .or_else(|| self.response_headers.clone()),
            status_codes: overrides.status_codes.clone().or_else(|| self.status_codes.clone()),
            default_methods: overrides.default_methods.or(self.default_methods),
            default_request_headers: overrides
                .default_request_headers
                .or(self.default_request_headers),
            default_response_headers: overrides
                .default_response_headers
                .or(self.default_response_headers),
            default_status_codes: overrides.default_status_codes.or(self.default_status_codes),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RawConfig::default()
    }
}

// ─── Resolved options ────────────────────────────────────────────────────────

/// Fully resolved generation options. Built once per run and only read after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    max_depth:        u32,
    methods:          Vec<Method>,
    request_headers:  Vec<String>,
    response_headers: Vec<String>,
    status_codes:     Vec<u16>,
}

impl Options {
    pub fn resolve(raw: &RawConfig) -> Result<Self, OptionError> {
        let max_depth = resolve_max_depth(raw.max_depth.as_ref())?;
        debug!(max_depth, "resolved maxDepth");

        let methods = resolve_methods(raw)?;
        debug!(?methods, "resolved methods");

        let request_headers = coalesce(
            "requestHeaders",
            raw.default_request_headers,
            &owned(DEFAULT_REQUEST_HEADERS),
            raw.request_headers.as_ref(),
            string_entry("requestHeaders"),
        )?;
        debug!(?request_headers, "resolved requestHeaders");

        let response_headers = coalesce(
            "responseHeaders",
            raw.default_response_headers,
            &owned(DEFAULT_RESPONSE_HEADERS),
            raw.response_headers.as_ref(),
            string_entry("responseHeaders"),
        )?;
        debug!(?response_headers, "resolved responseHeaders");

        let status_codes = resolve_status_codes(raw)?;
        debug!(?status_codes, "resolved statusCodes");

        Ok(Options {
            max_depth,
            methods,
            request_headers,
            response_headers,
            status_codes,
        })
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn request_headers(&self) -> &[String] {
        &self.request_headers
    }

    /// Response headers in resolution order (not yet sorted).
    pub fn response_headers(&self) -> &[String] {
        &self.response_headers
    }

    /// Status codes in resolution order; always contains [`FALLBACK_STATUS`] once.
    pub fn status_codes(&self) -> &[u16] {
        &self.status_codes
    }

    /// The single 2xx code of the set.
    pub fn success_code(&self) -> u16 {
        self.status_codes
            .iter()
            .copied()
            .find(|c| is_success(*c))
            .unwrap_or(FALLBACK_STATUS)
    }
}

pub fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Integral value of a JSON number, accepting `2.0` the same as `2`.
fn integral(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

fn resolve_max_depth(raw: Option<&Value>) -> Result<u32, OptionError> {
    let Some(value) = raw else {
        return Ok(DEFAULT_MAX_DEPTH);
    };
    integral(value)
        .and_then(|d| u32::try_from(d).ok())
        .ok_or_else(|| {
            OptionError::invalid(format!(
                "invalid value for maxDepth: {value}; must be a nonnegative integer"
            ))
        })
}

fn resolve_methods(raw: &RawConfig) -> Result<Vec<Method>, OptionError> {
    let methods = coalesce(
        "methods",
        raw.default_methods,
        DEFAULT_METHODS,
        raw.methods.as_ref(),
        |_, item| {
            item.as_str()
                .ok_or_else(|| OptionError::invalid(format!("methods entries must be strings, got {item}")))?
                .parse::<Method>()
        },
    )?;

    if methods.is_empty() {
        return Err(OptionError::configuration(
            "methods required when defaults are disabled; list them in the methods attribute",
        ));
    }
    Ok(methods)
}

fn resolve_status_codes(raw: &RawConfig) -> Result<Vec<u16>, OptionError> {
    let mut codes = coalesce(
        "statusCodes",
        raw.default_status_codes,
        DEFAULT_STATUS_CODES,
        raw.status_codes.as_ref(),
        |working: &[u16], item: &Value| {
            let code = integral(item).ok_or_else(|| {
                OptionError::invalid(format!("status codes must be integers, got {item}"))
            })?;
            if !(MIN_STATUS..=MAX_STATUS).contains(&code) {
                return Err(OptionError::invalid(format!(
                    "status code {code} is outside the supported range ({MIN_STATUS}-{MAX_STATUS})"
                )));
            }
            let code = code as u16;
            if let Some(existing) = working.iter().find(|c| is_success(**c) && **c != code) {
                if is_success(code) {
                    return Err(OptionError::configuration(format!(
                        "only one success status code allowed; {existing} is already configured, got {code}"
                    )));
                }
            }
            Ok(code)
        },
    )?;

    if codes.is_empty() {
        return Err(OptionError::configuration(
            "status codes required when defaults are disabled; list them in the statusCodes attribute",
        ));
    }
    if !codes.iter().any(|c| is_success(*c)) {
        return Err(OptionError::configuration(
            "a single 2xx success status code is required",
        ));
    }
    if !codes.contains(&FALLBACK_STATUS) {
        codes.push(FALLBACK_STATUS);
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(v: Value) -> Result<Options, OptionError> {
        Options::resolve(&RawConfig::from_value(v)?)
    }

    #[test]
    fn empty_table_resolves_to_defaults() {
        let opts = resolve(json!({})).unwrap();
        assert_eq!(opts.max_depth(), 0);
        assert_eq!(opts.methods(), &[Method::Get]);
        assert!(opts.request_headers().is_empty());
        assert_eq!(opts.response_headers(), owned(DEFAULT_RESPONSE_HEADERS).as_slice());
        assert_eq!(opts.status_codes(), &[200, 404, 500]);
        assert_eq!(opts.success_code(), 200);
    }

    #[test]
    fn max_depth_accepts_integral_numbers() {
        assert_eq!(resolve(json!({"maxDepth": 3})).unwrap().max_depth(), 3);
        assert_eq!(resolve(json!({"maxDepth": 2.0})).unwrap().max_depth(), 2);
    }

    #[test]
    fn max_depth_rejects_bad_values() {
        for bad in [json!(-1), json!(1.5), json!("2"), json!(null), json!([1])] {
            let err = resolve(json!({ "maxDepth": bad })).unwrap_err();
            assert!(
                matches!(err, OptionError::InvalidOption(ref m) if m.contains("maxDepth")),
                "{bad} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn methods_union_with_default_get() {
        let opts = resolve(json!({"methods": ["POST", "GET", "POST"]})).unwrap();
        assert_eq!(opts.methods(), &[Method::Get, Method::Post]);
    }

    #[test]
    fn unknown_method_is_invalid() {
        let err = resolve(json!({"methods": ["TRACE"]})).unwrap_err();
        assert!(matches!(err, OptionError::InvalidOption(ref m) if m.contains("TRACE")));

        let lower = resolve(json!({"methods": ["get"]})).unwrap_err();
        assert!(matches!(lower, OptionError::InvalidOption(_)));
    }

    #[test]
    fn disabled_method_defaults_require_methods() {
        let err = resolve(json!({"defaultMethods": false})).unwrap_err();
        assert!(matches!(err, OptionError::Configuration(ref m) if m.contains("methods required")));

        let opts = resolve(json!({"defaultMethods": false, "methods": ["PUT"]})).unwrap();
        assert_eq!(opts.methods(), &[Method::Put]);
    }

    #[test]
    fn non_boolean_flag_is_invalid() {
        let err = RawConfig::from_value(json!({"defaultMethods": "no"})).unwrap_err();
        assert!(matches!(err, OptionError::InvalidOption(_)));
    }

    #[test]
    fn headers_follow_opt_out_union() {
        let opts = resolve(json!({
            "requestHeaders": ["Authorization", "X-Trace", "Authorization"],
            "defaultResponseHeaders": false,
            "responseHeaders": ["Zeta", "Alpha"]
        }))
        .unwrap();
        assert_eq!(opts.request_headers(), &["Authorization".to_string(), "X-Trace".to_string()]);
        assert_eq!(opts.response_headers(), &["Zeta".to_string(), "Alpha".to_string()]);
    }

    #[test]
    fn response_headers_extend_defaults() {
        let opts = resolve(json!({"responseHeaders": ["Location", "ETag"]})).unwrap();
        let mut expected = owned(DEFAULT_RESPONSE_HEADERS);
        expected.push("Location".to_string());
        assert_eq!(opts.response_headers(), expected.as_slice());
    }

    #[test]
    fn fallback_status_added_exactly_once() {
        let implicit = resolve(json!({"defaultStatusCodes": false, "statusCodes": [201]})).unwrap();
        assert_eq!(implicit.status_codes(), &[201, 500]);

        let explicit = resolve(json!({"defaultStatusCodes": false, "statusCodes": [500, 201, 500]})).unwrap();
        assert_eq!(explicit.status_codes(), &[500, 201]);
        assert_eq!(explicit.status_codes().iter().filter(|c| **c == 500).count(), 1);
    }

    #[test]
    fn second_success_code_is_rejected() {
        let err = resolve(json!({"statusCodes": [201]})).unwrap_err();
        assert!(matches!(err, OptionError::Configuration(ref m) if m.contains("only one success status code")));

        let err = resolve(json!({"defaultStatusCodes": false, "statusCodes": [200, 204]})).unwrap_err();
        assert!(matches!(err, OptionError::Configuration(_)));
    }

    #[test]
    fn repeating_the_default_success_code_is_fine() {
        let opts = resolve(json!({"statusCodes": [200, 302]})).unwrap();
        assert_eq!(opts.status_codes(), &[200, 404, 500, 302]);
    }

    #[test]
    fn missing_success_code_is_rejected() {
        let err = resolve(json!({"defaultStatusCodes": false, "statusCodes": [404]})).unwrap_err();
        assert!(matches!(err, OptionError::Configuration(ref m) if m.contains("2xx")));
    }

    #[test]
    fn empty_status_codes_are_rejected() {
        let err = resolve(json!({"defaultStatusCodes": false})).unwrap_err();
        assert!(matches!(err, OptionError::Configuration(ref m) if m.contains("status codes required")));
    }

    #[test]
    fn out_of_range_and_non_integer_codes_are_invalid() {
        for bad in [json!(199), json!(600), json!(-200), json!(404.5), json!("404")] {
            let err = resolve(json!({ "statusCodes": [bad] })).unwrap_err();
            assert!(matches!(err, OptionError::InvalidOption(_)), "{bad} should be invalid");
        }
        let err = resolve(json!({"statusCodes": [600]})).unwrap_err();
        assert!(err.to_string().contains("outside the supported range"));
    }

    #[test]
    fn overlay_prefers_overrides() {
        let stored = RawConfig::from_value(json!({"maxDepth": 1, "methods": ["POST"]})).unwrap();
        let overrides = RawConfig::from_value(json!({"maxDepth": 4, "defaultMethods": false})).unwrap();
        let merged = stored.overlay(&overrides);
        assert_eq!(merged.max_depth, Some(json!(4)));
        assert_eq!(merged.methods, Some(json!(["POST"])));
        assert_eq!(merged.default_methods, Some(false));
        assert!(RawConfig::default().overlay(&RawConfig::default()).is_empty());
    }

    #[test]
    fn explicit_null_counts_as_present() {
        let raw = RawConfig::from_value(json!({"methods": null})).unwrap();
        assert_eq!(raw.methods, Some(Value::Null));
        assert!(Options::resolve(&raw).is_err());
    }
}

//! Line-delimited JSON-RPC 2.0 tool server on stdin/stdout.
//!
//! Exposes generation, preview and simulation as tools so an editor or agent
//! can drive them without shelling out. Logs go to stderr; stdout carries
//! protocol frames only.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::gateway::options::RawConfig;
use crate::gateway::resolve_and_generate;
use crate::generate::{generate, simulate_response, Target};

pub fn serve<R: BufRead, W: Write>(input: R, output: W) -> Result<()> {
    let server = ToolServer;
    let mut out = std::io::BufWriter::new(output);

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v)  => v,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                continue;
            }
        };

        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id     = msg.get("id").cloned().unwrap_or(Value::Null);
        let params = msg.get("params").cloned().unwrap_or(json!({}));
        debug!(method, "request");

        let response = match method {
            "initialize" => server.initialize(id),
            "tools/list" => server.tools_list(id),
            "tools/call" => server.tool_call(id, &params),
            "notifications/initialized" | "notifications/cancelled" => continue,
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {}", method) }
            }),
        };

        let mut s = serde_json::to_string(&response)?;
        s.push('\n');
        out.write_all(s.as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

// ─── Server ───────────────────────────────────────────────────────────────────

struct ToolServer;

impl ToolServer {
    fn initialize(&self, id: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name":    "lambdefy",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        })
    }

    fn tools_list(&self, id: Value) -> Value {
        let options_schema = json!({
            "type": "object",
            "description": "Option table in custom.lambdefy form (maxDepth, methods, requestHeaders, responseHeaders, statusCodes, default* flags)."
        });
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [
                    {
                        "name": "lambdefy_generate",
                        "description": "Generate catch-all endpoints for a function and replace the endpoints list in its s-function file. Give 'file', or 'project_root' (optionally with 'name') to locate the function carrying custom.lambdefy.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "file":         { "type": "string", "description": "Path to an s-function.{json,yaml,toml} file." },
                                "project_root": { "type": "string", "description": "Project directory to search." },
                                "name":         { "type": "string", "description": "Function name to select inside the project." },
                                "dry_run":      { "type": "boolean", "description": "Resolve and count without writing.", "default": false },
                                "overrides":    options_schema
                            }
                        }
                    },
                    {
                        "name": "lambdefy_preview",
                        "description": "Resolve an option table and return the endpoint descriptors it generates. Writes nothing.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "config": options_schema },
                            "required": ["config"]
                        }
                    },
                    {
                        "name": "lambdefy_simulate",
                        "description": "Show the response the gateway would produce when the function answers with the given status, body and headers.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "config":  options_schema,
                                "status":  { "type": "integer", "description": "Status the function reports." },
                                "body":    { "type": "string", "description": "Response body." },
                                "headers": { "type": "object", "description": "Header name to value." }
                            },
                            "required": ["status"]
                        }
                    }
                ]
            }
        })
    }

    fn tool_call(&self, id: Value, params: &Value) -> Value {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let ok  = |text: String| json!({ "jsonrpc": "2.0", "id": id, "result": { "content": [{"type":"text","text": text}], "isError": false } });
        let err = |msg: String|  json!({ "jsonrpc": "2.0", "id": id, "result": { "content": [{"type":"text","text": msg}],  "isError": true  } });

        let result = match name {
            "lambdefy_generate" => call_generate(&args),
            "lambdefy_preview"  => call_preview(&args),
            "lambdefy_simulate" => call_simulate(&args),
            other => return err(format!("Unknown tool: '{}'. Available tools: lambdefy_generate, lambdefy_preview, lambdefy_simulate", other)),
        };

        match result {
            Ok(v)  => ok(serde_json::to_string_pretty(&v).unwrap_or_default()),
            Err(e) => err(format!("{} failed: {:#}", name, e)),
        }
    }
}

fn raw_config(args: &Value, key: &str) -> Result<RawConfig> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(RawConfig::default()),
        Some(v) => RawConfig::from_value(v.clone()).with_context(|| format!("'{}' is not a valid option table", key)),
    }
}

fn call_generate(args: &Value) -> Result<Value> {
    let target = match (
        args.get("file").and_then(|v| v.as_str()),
        args.get("project_root").and_then(|v| v.as_str()),
    ) {
        (Some(file), _) => Target::File(PathBuf::from(file)),
        (None, Some(root)) => Target::Project {
            root: PathBuf::from(root),
            name: args.get("name").and_then(|v| v.as_str()).map(|s| s.to_string()),
        },
        (None, None) => anyhow::bail!("'file' or 'project_root' required"),
    };
    let dry_run = args.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);
    let report = generate(&target, &raw_config(args, "overrides")?, dry_run)?;
    Ok(serde_json::to_value(report)?)
}

fn call_preview(args: &Value) -> Result<Value> {
    let endpoints = resolve_and_generate(&raw_config(args, "config")?)?;
    Ok(serde_json::to_value(endpoints)?)
}

fn call_simulate(args: &Value) -> Result<Value> {
    let status = args
        .get("status")
        .and_then(|v| v.as_u64())
        .and_then(|s| u16::try_from(s).ok())
        .context("'status' integer required")?;
    let body = args.get("body").and_then(|v| v.as_str()).unwrap_or("");
    let headers: BTreeMap<String, String> = match args.get("headers") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(v) => serde_json::from_value(v.clone()).context("'headers' must map names to strings")?,
    };
    let report = simulate_response(&raw_config(args, "config")?, status, body, &headers)?;
    Ok(serde_json::to_value(report)?)
}

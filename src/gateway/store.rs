use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

use crate::gateway::endpoint::EndpointDescriptor;
use crate::gateway::options::RawConfig;
use crate::gateway::{ConfigSink, ConfigSource};

/// File stem of a function's declarative config (`s-function.json`, …).
pub const FUNCTION_FILE_STEM: &str = "s-function";

/// Key under `custom` holding the option table.
pub const CUSTOM_KEY: &str = "lambdefy";

const ENDPOINTS_KEY: &str = "endpoints";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => bail!("Unsupported config file extension: .{}", other),
        }
    }

    fn parse(self, raw: &str) -> Result<Value> {
        let doc: Value = match self {
            Format::Json => serde_json::from_str(raw).context("Parsing JSON")?,
            Format::Yaml => serde_yaml::from_str(raw).context("Parsing YAML")?,
            Format::Toml => toml::from_str(raw).context("Parsing TOML")?,
        };
        if !doc.is_object() {
            bail!("Function config must be a mapping at the top level");
        }
        Ok(doc)
    }
}

/// A function's `s-function.*` file, read once and rewritten in place.
#[derive(Debug, Clone)]
pub struct FunctionFile {
    path:     PathBuf,
    format:   Format,
    raw:      String,
    document: Value,
}

impl FunctionFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = Format::from_path(&path)?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Reading function config {}", path.display()))?;
        let document = format
            .parse(&raw)
            .with_context(|| format!("Loading {}", path.display()))?;
        Ok(FunctionFile { path, format, raw, document })
    }

    pub fn is_function_file(path: &Path) -> bool {
        path.file_stem().and_then(|s| s.to_str()) == Some(FUNCTION_FILE_STEM)
            && Format::from_path(path).is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    fn custom(&self) -> Option<&Value> {
        self.document.get("custom").and_then(|c| c.get(CUSTOM_KEY))
    }

    pub fn has_custom(&self) -> bool {
        self.custom().is_some()
    }

    pub fn endpoint_count(&self) -> usize {
        self.document
            .get(ENDPOINTS_KEY)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// New file contents with `endpoints` replaced and everything else kept.
    pub fn render(&self, endpoints: &[EndpointDescriptor]) -> Result<String> {
        match self.format {
            Format::Json => render_json(&self.document, endpoints),
            Format::Yaml => render_yaml(&self.raw, endpoints),
            Format::Toml => render_toml(&self.raw, endpoints),
        }
    }
}

impl ConfigSource for FunctionFile {
    fn custom_config(&self) -> Result<RawConfig> {
        match self.custom() {
            None => Ok(RawConfig::default()),
            Some(v) => RawConfig::from_value(v.clone())
                .with_context(|| format!("Reading custom.{} in {}", CUSTOM_KEY, self.path.display())),
        }
    }
}

impl ConfigSink for FunctionFile {
    fn replace_endpoints(&mut self, endpoints: &[EndpointDescriptor]) -> Result<()> {
        let out = self.render(endpoints)?;
        std::fs::write(&self.path, &out)
            .with_context(|| format!("Writing function config {}", self.path.display()))?;
        info!(
            file = %self.path.display(),
            replaced = self.endpoint_count(),
            written = endpoints.len(),
            "replaced endpoints"
        );
        self.document = self.format.parse(&out)?;
        self.raw = out;
        Ok(())
    }
}

// ─── JSON ────────────────────────────────────────────────────────────────────

fn render_json(document: &Value, endpoints: &[EndpointDescriptor]) -> Result<String> {
    let mut root = document.clone();
    root[ENDPOINTS_KEY] = serde_json::to_value(endpoints).context("Serializing endpoints")?;
    let mut out = serde_json::to_string_pretty(&root).context("Serializing JSON")?;
    out.push('\n');
    Ok(out)
}

// ─── YAML ────────────────────────────────────────────────────────────────────

fn render_yaml(raw: &str, endpoints: &[EndpointDescriptor]) -> Result<String> {
    let mut root: serde_yaml::Value = serde_yaml::from_str(raw).context("Parsing YAML")?;
    let map = root
        .as_mapping_mut()
        .context("Function config must be a mapping at the top level")?;
    map.insert(
        serde_yaml::Value::String(ENDPOINTS_KEY.to_string()),
        serde_yaml::to_value(endpoints).context("Serializing endpoints")?,
    );
    serde_yaml::to_string(&root).context("Serializing YAML")
}

// ─── TOML ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EndpointsDoc<'a> {
    endpoints: &'a [EndpointDescriptor],
}

/// Replace `endpoints` through `toml_edit` so comments and layout elsewhere in
/// the file survive.
fn render_toml(raw: &str, endpoints: &[EndpointDescriptor]) -> Result<String> {
    let mut doc: DocumentMut = raw.parse().context("Parsing TOML")?;
    let rendered = toml::to_string(&EndpointsDoc { endpoints }).context("Serializing endpoints")?;
    let fresh: DocumentMut = rendered.parse().context("Re-parsing serialized endpoints")?;

    doc.remove(ENDPOINTS_KEY);
    if let Some(item) = fresh.get(ENDPOINTS_KEY) {
        let mut item = item.clone();
        // Positions come from the scratch document; move them past the
        // existing tables so the new ones are emitted at the end.
        let base = max_position(doc.as_table()).map_or(0, |p| p + 1);
        shift_positions(&mut item, base);
        doc.insert(ENDPOINTS_KEY, item);
    }
    Ok(doc.to_string())
}

fn max_position(table: &Table) -> Option<usize> {
    let mut max = table.position();
    for (_, item) in table.iter() {
        let nested = match item {
            Item::Table(t) => max_position(t),
            Item::ArrayOfTables(aot) => aot.iter().filter_map(max_position).max(),
            _ => None,
        };
        max = max.max(nested);
    }
    max
}

fn shift_positions(item: &mut Item, base: usize) {
    match item {
        Item::Table(t) => shift_table(t, base),
        Item::ArrayOfTables(aot) => {
            for t in aot.iter_mut() {
                shift_table(t, base);
            }
        }
        _ => {}
    }
}

fn shift_table(table: &mut Table, base: usize) {
    if let Some(p) = table.position() {
        table.set_position(p + base);
    }
    for (_, item) in table.iter_mut() {
        shift_positions(item, base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::resolve_and_generate;
    use serde_json::json;
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn endpoints(v: Value) -> Vec<EndpointDescriptor> {
        resolve_and_generate(&RawConfig::from_value(v).unwrap()).unwrap()
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(Format::from_path(Path::new("a/s-function.json")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("s-function.YML")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("s-function.toml")).unwrap(), Format::Toml);
        assert!(Format::from_path(Path::new("s-function.ini")).is_err());
        assert!(FunctionFile::is_function_file(Path::new("x/s-function.yaml")));
        assert!(!FunctionFile::is_function_file(Path::new("x/s-project.json")));
    }

    #[test]
    fn json_endpoints_replaced_and_rest_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "s-function.json",
            r#"{"name": "app", "runtime": "nodejs4.3", "custom": {"lambdefy": {"maxDepth": 1}}, "endpoints": [{"path": "old"}, {"path": "older"}]}"#,
        );

        let mut file = FunctionFile::load(&path).unwrap();
        assert_eq!(file.name(), Some("app"));
        assert_eq!(file.endpoint_count(), 2);
        let raw = file.custom_config().unwrap();
        assert_eq!(raw.max_depth, Some(json!(1)));

        file.replace_endpoints(&endpoints(json!({"maxDepth": 1}))).unwrap();
        assert_eq!(file.endpoint_count(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let val: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(val["runtime"], "nodejs4.3");
        assert_eq!(val["endpoints"][1]["path"], "/{p0}");
        assert!(text.ends_with("}\n"));
        let keys: Vec<&String> = val.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "runtime", "custom", "endpoints"]);
    }

    #[test]
    fn yaml_endpoints_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "s-function.yaml",
            "name: app\ncustom:\n  lambdefy:\n    methods: [POST]\n",
        );
        let mut file = FunctionFile::load(&path).unwrap();
        let raw = file.custom_config().unwrap();
        file.replace_endpoints(&resolve_and_generate(&raw).unwrap()).unwrap();

        let val: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(val["name"], "app");
        assert_eq!(val["endpoints"].as_array().unwrap().len(), 2);
        assert_eq!(val["endpoints"][1]["method"], "POST");
    }

    #[test]
    fn toml_keeps_comments_and_replaces_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "s-function.toml",
            "# handler for the whole app\nname = \"app\"\n\n[custom.lambdefy]\nmaxDepth = 1 # two levels\n\n[[endpoints]]\npath = \"stale\"\n",
        );
        let mut file = FunctionFile::load(&path).unwrap();
        let raw = file.custom_config().unwrap();
        file.replace_endpoints(&resolve_and_generate(&raw).unwrap()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# handler for the whole app"));
        assert!(text.contains("maxDepth = 1 # two levels"));
        assert!(!text.contains("stale"));

        let val: Value = toml::from_str(&text).unwrap();
        assert_eq!(val["custom"]["lambdefy"]["maxDepth"], 1);
        let eps = val["endpoints"].as_array().unwrap();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[1]["path"], "/{p0}");
        assert_eq!(eps[0]["responses"]["default"]["statusCode"], "500");
    }

    #[test]
    fn missing_custom_table_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "s-function.json", r#"{"name": "plain"}"#);
        let file = FunctionFile::load(&path).unwrap();
        assert!(!file.has_custom());
        assert!(file.custom_config().unwrap().is_empty());
    }

    #[test]
    fn malformed_custom_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "s-function.json", r#"{"custom": {"lambdefy": ["GET"]}}"#);
        let file = FunctionFile::load(&path).unwrap();
        assert!(file.custom_config().is_err());
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "s-function.json", "[1, 2]");
        assert!(FunctionFile::load(&path).is_err());
    }
}

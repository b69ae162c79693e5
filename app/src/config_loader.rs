//! Config file loading and structural validation.
//!
//! The file is a JSON object with an `outbounds` array. Each entry names a
//! `type` (protocol id) and optional `tag`; every other field is handed to
//! the protocol binder untouched.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub outbounds: Vec<OutboundEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OutboundEntry {
    #[serde(rename = "type")]
    pub protocol: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl OutboundEntry {
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.protocol)
    }

    pub fn options_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.options.clone())
    }
}

pub fn load(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn parse(raw: &str) -> Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(raw)?;
    if config.outbounds.is_empty() {
        bail!("no outbounds configured");
    }
    let mut tags = HashSet::new();
    for entry in &config.outbounds {
        if !tags.insert(entry.tag()) {
            bail!("duplicate outbound tag {:?}", entry.tag());
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_outbounds_with_passthrough_options() {
        let config = parse(
            r#"{ "outbounds": [
                { "type": "ssh", "tag": "tunnel-a", "server": "a.example", "method": "tls" },
                { "type": "direct", "server": "b.example", "port": 8080 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(config.outbounds.len(), 2);
        assert_eq!(config.outbounds[0].tag(), "tunnel-a");
        assert_eq!(config.outbounds[1].tag(), "direct");
        assert_eq!(
            config.outbounds[0].options_value()["method"],
            serde_json::json!("tls")
        );
    }

    #[test]
    fn empty_outbound_list_is_rejected() {
        assert!(parse(r#"{ "outbounds": [] }"#).is_err());
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let err = parse(
            r#"{ "outbounds": [
                { "type": "direct", "server": "a", "port": 1 },
                { "type": "direct", "server": "b", "port": 2 }
            ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}

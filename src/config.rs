// Registry credential configuration (~/.config/ek/config.toml or a Docker config.json)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::docker::AuthMapping;

/// Root structure of the ek config file
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    /// Optional version (must be 1 if present)
    version: Option<u32>,

    /// Registry host -> auth string
    #[serde(default)]
    auths: HashMap<String, String>,
}

/// The subset of a Docker CLI config.json that carries credentials
#[derive(Debug, Deserialize, Default)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,

    #[serde(rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DockerAuthEntry {
    auth: Option<String>,
    identitytoken: Option<String>,
}

/// Get the default path of the config file
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".config").join("ek").join("config.toml"))
}

/// Load the registry auth mapping from `path`.
///
/// A missing file yields an empty mapping. Paths ending in `.json` are read as
/// a Docker CLI config, everything else as TOML.
pub fn load_auth_mapping(path: &Path) -> Result<AuthMapping> {
    if !path.exists() {
        debug!(
            "Config file {} not found, using anonymous registry access",
            path.display()
        );
        return Ok(AuthMapping::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mapping = if is_json {
        parse_docker_config(&contents)
            .with_context(|| format!("Failed to parse Docker config {}", path.display()))?
    } else {
        parse_toml_config(&contents, path)?
    };

    if mapping.is_empty() {
        warn!("No registry credentials found in {}", path.display());
        return Ok(mapping);
    }

    info!(
        "Loaded credentials for {} registr{} from {}",
        mapping.len(),
        if mapping.len() == 1 { "y" } else { "ies" },
        path.display()
    );
    Ok(mapping)
}

fn parse_toml_config(contents: &str, path: &Path) -> Result<AuthMapping> {
    // Deserialize and collect any unused fields
    let mut unused_fields = Vec::new();
    let deserializer = toml::Deserializer::new(contents);
    let config: ConfigFile = serde_ignored::deserialize(deserializer, |field| {
        unused_fields.push(field.to_string());
    })
    .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    for field in &unused_fields {
        warn!(
            "Unknown configuration field in {}: {}",
            path.display(),
            field
        );
    }

    if let Some(version) = config.version {
        if version != 1 {
            bail!(
                "Unsupported config version: {}. This CLI supports version 1.",
                version
            );
        }
    }

    Ok(config
        .auths
        .into_iter()
        .map(|(host, auth)| (normalize_registry_host(&host), auth))
        .collect())
}

fn parse_docker_config(contents: &str) -> Result<AuthMapping> {
    let config: DockerConfigFile = serde_json::from_str(contents)?;

    if let Some(store) = &config.creds_store {
        warn!(
            "Docker credential store '{}' is not supported; only inline auths are used",
            store
        );
    }

    Ok(config
        .auths
        .into_iter()
        .filter_map(|(host, entry)| {
            let auth = entry.auth.filter(|a| !a.is_empty()).or(entry.identitytoken)?;
            Some((normalize_registry_host(&host), auth))
        })
        .collect())
}

/// Reduce a registry key such as `https://index.docker.io/v1/` to its host
fn normalize_registry_host(key: &str) -> String {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

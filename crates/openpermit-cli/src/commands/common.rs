//! Configuration helpers shared by subcommands
//!
//! Only `demo` needs credentials, so the offline commands read just the
//! parts of the configuration they use.

use anyhow::{Context, Result};
use openpermit_bridge::config::{DEFAULT_ALIAS_SERVER, DEFAULT_ROOM_PREFIX};
use openpermit_bridge::BridgeConfig;
use openpermit_core::effects::ShapeSource;
use std::path::Path;

/// Prefix and server used to derive aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSettings {
    pub prefix: String,
    pub server: String,
}

/// Load a full bridge configuration from `path`
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    BridgeConfig::from_toml_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

/// Alias settings from the config file, the environment, or the defaults
pub fn alias_settings(config: Option<&Path>) -> Result<AliasSettings> {
    if let Some(path) = config {
        let config = load_config(path)?;
        return Ok(AliasSettings {
            prefix: config.room_alias_prefix,
            server: config.alias_server,
        });
    }
    Ok(AliasSettings {
        prefix: env_or("OPENPERMIT_ROOM_PREFIX", DEFAULT_ROOM_PREFIX),
        server: env_or("OPENPERMIT_ALIAS_SERVER", DEFAULT_ALIAS_SERVER),
    })
}

/// Shape set to validate with: explicit flag, then config file, then
/// `OPENPERMIT_SHAPES`, then the bundled set
pub fn shape_source(config: Option<&Path>, explicit: Option<&Path>) -> Result<ShapeSource> {
    if let Some(path) = explicit {
        return Ok(ShapeSource::File(path.to_path_buf()));
    }
    if let Some(path) = config {
        return Ok(load_config(path)?.shape_source());
    }
    Ok(std::env::var("OPENPERMIT_SHAPES")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map_or(ShapeSource::Bundled, |v| ShapeSource::File(v.into())))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn explicit_shapes_win() {
        let source = shape_source(None, Some(Path::new("custom.json"))).unwrap();
        assert_eq!(source, ShapeSource::File(PathBuf::from("custom.json")));
    }

    #[test]
    fn config_file_supplies_alias_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(
            &path,
            r#"
            user_id = "@permits:example.gov"
            access_token = "t"
            room_alias_prefix = "city"
            alias_server = "example.gov"
            "#,
        )
        .unwrap();

        let settings = alias_settings(Some(&path)).unwrap();
        assert_eq!(
            settings,
            AliasSettings {
                prefix: "city".into(),
                server: "example.gov".into()
            }
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(alias_settings(Some(Path::new("/nonexistent/bridge.toml"))).is_err());
    }
}

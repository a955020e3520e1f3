//! Configuration vault – reads/writes `~/.laneloc/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use laneloc_types::{LaneError, LaneFilterConfig};
use serde::{Deserialize, Serialize};

/// Persisted CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Port of the WebSocket bridge.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Lane filter parameters.
    #[serde(default)]
    pub filter: LaneFilterConfig,
}

fn default_ws_port() -> u16 {
    9090
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            ws_port: default_ws_port(),
            filter: LaneFilterConfig::default(),
        }
    }
}

/// Return the path to `~/.laneloc/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".laneloc").join("config.toml")
}

/// Load the file at `path` (or the default location), falling back to
/// defaults when it does not exist, then apply environment overrides and
/// validate.
///
/// # Errors
///
/// Returns [`LaneError::Serialization`] when the file cannot be read or
/// parsed, and [`LaneError::InvalidConfiguration`] when the resulting filter
/// configuration is invalid.
pub fn resolve(path: Option<&Path>) -> Result<CliConfig, LaneError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.filter.validate()?;
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<CliConfig>, LaneError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        LaneError::Serialization(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: CliConfig = toml::from_str(&raw)
        .map_err(|e| LaneError::Serialization(format!("Failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `LANELOC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LANELOC_WS_PORT` | `ws_port` |
/// | `LANELOC_RANGE_MIN` | `filter.observation.range_min` |
/// | `LANELOC_RANGE_MAX` | `filter.observation.range_max` |
/// | `LANELOC_MIN_MAX` | `filter.estimate.min_max` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut CliConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut CliConfig, lookup: impl Fn(&str) -> Option<String>) {
    let parse_f64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

    if let Some(port) = lookup("LANELOC_WS_PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
        cfg.ws_port = port;
    }
    if let Some(v) = parse_f64("LANELOC_RANGE_MIN") {
        cfg.filter.observation.range_min = v;
    }
    if let Some(v) = parse_f64("LANELOC_RANGE_MAX") {
        cfg.filter.observation.range_max = v;
    }
    if let Some(v) = parse_f64("LANELOC_MIN_MAX") {
        cfg.filter.estimate.min_max = v;
    }
}

/// Save the config to a specific path, creating its directory if necessary.
///
/// # Errors
///
/// Returns [`LaneError::Serialization`] on any encoding or I/O failure.
pub(crate) fn save_to(cfg: &CliConfig, path: &Path) -> Result<(), LaneError> {
    let io_err = |what: &str, e: std::io::Error| LaneError::Serialization(format!("{what}: {e}"));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("Failed to create config directory", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("Failed to set config directory permissions", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LaneError::Serialization(format!("Failed to serialize config: {e}")))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| io_err(&format!("Failed to write config at {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| io_err(&format!("Failed to write config at {}", path.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneloc_types::config::PriorConfig;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&CliConfig::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, CliConfig::default());
        assert_eq!(loaded.ws_port, 9090);
    }

    #[test]
    fn roundtrip_keeps_uniform_prior() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("lane.toml");

        let mut cfg = CliConfig::default();
        cfg.filter.prior = PriorConfig::Uniform;
        cfg.filter.grid.d.delta = 0.01;
        save_to(&cfg, &path).expect("save");

        assert_eq!(load_from(&path).expect("load").expect("some"), cfg);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&CliConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let parent = path.parent().expect("parent");
        let dir_mode = std::fs::metadata(parent).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ws_port = 9191\n\n[filter.observation]\nrange_max = 1.5\n")
            .expect("write");

        let cfg = load_from(&path).expect("load").expect("some");
        assert_eq!(cfg.ws_port, 9191);
        assert!((cfg.filter.observation.range_max - 1.5).abs() < 1e-12);
        assert!((cfg.filter.observation.range_min - 0.6).abs() < 1e-12);
        assert_eq!(cfg.filter.grid, LaneFilterConfig::default().grid);
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ws_port = \"not a port\"").expect("write");
        assert!(matches!(load_from(&path), Err(LaneError::Serialization(_))));
    }

    #[test]
    fn resolve_rejects_invalid_filter_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter.estimate]\nmin_max = 1.5\n").expect("write");
        assert!(matches!(
            resolve(Some(&path)),
            Err(LaneError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn resolve_without_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = resolve(Some(&dir.path().join("missing.toml"))).expect("defaults");
        assert_eq!(cfg.filter, LaneFilterConfig::default());
    }

    #[test]
    fn config_path_points_to_laneloc_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".laneloc"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_apply_to_port_range_and_threshold() {
        let mut cfg = CliConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("LANELOC_WS_PORT", "9999"),
                ("LANELOC_RANGE_MIN", "0.4"),
                ("LANELOC_RANGE_MAX", " 1.6 "),
                ("LANELOC_MIN_MAX", "0.25"),
            ]),
        );
        assert_eq!(cfg.ws_port, 9999);
        assert!((cfg.filter.observation.range_min - 0.4).abs() < 1e-12);
        assert!((cfg.filter.observation.range_max - 1.6).abs() < 1e-12);
        assert!((cfg.filter.estimate.min_max - 0.25).abs() < 1e-12);
    }

    #[test]
    fn env_overrides_ignore_unparseable_values() {
        let mut cfg = CliConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[("LANELOC_WS_PORT", "not-a-port"), ("LANELOC_MIN_MAX", "high")]),
        );
        assert_eq!(cfg, CliConfig::default());
    }
}

//! Application configuration.
//!
//! The configuration is a JSON object of named sections.  It is read from
//! the file passed with `--config <path>`, or else from the first
//! `aria-shell/config.json` found in `$XDG_CONFIG_HOME` and
//! `$XDG_CONFIG_DIRS`.  Without a file every section uses its compiled-in
//! defaults.
//!
//! Sections named `<prefix>:<instance>` are instances of the same kind of
//! section, see [`Config::sections`].
//!
//! # Example
//!
//! ```json
//! {
//!   "general": { "modules": "clock workspaces", "terminal": "no" },
//!   "socket": { "path": "/run/user/1000/aria.sock" },
//!   "workspaces": { "backends": ["hyprland"] },
//!   "panel:top": { "position": "top" }
//! }
//! ```
//!
//! # Leniency
//!
//! Sections are loaded field by field, see [`Config::section`]: a bad value
//! only costs that one field, never the section or the whole file.

use crate::wm::backend::BackendKind;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "aria-shell";
pub const CONFIG_FILE: &str = "config.json";
pub const SOCKET_FILE: &str = "cmd.sock";

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{}: top level must be an object of sections", path.display())]
    NotAnObject { path: PathBuf },
}

//  Paths

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `$XDG_RUNTIME_DIR`, or `/tmp` when unset.
pub fn runtime_dir() -> PathBuf {
    env_path("XDG_RUNTIME_DIR").unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Where the command socket lives unless the config says otherwise.
pub fn default_socket_path() -> PathBuf {
    runtime_dir().join(CONFIG_DIR).join(SOCKET_FILE)
}

/// Directories searched for `aria-shell/config.json`, in order.
pub fn config_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    match env_path("XDG_CONFIG_HOME") {
        Some(home) => dirs.push(home),
        None => {
            if let Some(home) = env_path("HOME") {
                dirs.push(home.join(".config"));
            }
        }
    }
    let system = std::env::var("XDG_CONFIG_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/etc/xdg".into());
    dirs.extend(system.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
    dirs
}

/// First existing `aria-shell/config.json` under `dirs`.
pub fn lookup_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|file| file.is_file())
}

//  Sections

/// A typed view of one config section.
///
/// The `Default` value supplies both the defaults and, through its
/// serialized form, the type each key is coerced to.
pub trait ConfigSection: Default + Serialize + DeserializeOwned {
    /// Extra check run on a key's value once it has the right type.
    fn validate(_key: &str, _value: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Coerce a string from the file into the JSON type of `template`.
fn coerce(text: &str, template: &Value) -> Result<Value, String> {
    match template {
        Value::Bool(_) => Ok(Value::Bool(matches!(
            text.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ))),
        Value::Number(n) if n.is_f64() => text
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("invalid value: {} (must be float)", text)),
        Value::Number(_) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("invalid value: {} (must be integer)", text)),
        Value::Array(_) => Ok(Value::Array(
            text.split_whitespace().map(Value::from).collect(),
        )),
        _ => Ok(Value::String(text.to_string())),
    }
}

/// Build a `T` from `raw`, keeping the default for every key that is
/// unknown, empty or invalid.
pub fn load_section<T: ConfigSection>(name: &str, raw: &Map<String, Value>) -> T {
    let defaults = match serde_json::to_value(T::default()) {
        Ok(Value::Object(map)) => map,
        _ => {
            error!("[{}] cannot be described as an object, using defaults", name);
            return T::default();
        }
    };

    let mut accepted = defaults.clone();
    for (key, value) in raw {
        let Some(template) = defaults.get(key) else {
            warn!("invalid key '{}' in config section [{}]", key, name);
            continue;
        };
        let value = match value {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::String(s) if !template.is_string() => match coerce(s, template) {
                Ok(v) => v,
                Err(e) => {
                    error!("[{}] {}: {}", name, key, e);
                    continue;
                }
            },
            other => other.clone(),
        };

        let previous = accepted.insert(key.clone(), value.clone());
        let checked = serde_json::from_value::<T>(Value::Object(accepted.clone()))
            .map_err(|e| e.to_string())
            .and_then(|_| T::validate(key, &value));
        if let Err(e) = checked {
            error!("[{}] {}: {}", name, key, e);
            match previous {
                Some(p) => accepted.insert(key.clone(), p),
                None => accepted.remove(key),
            };
        }
    }

    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}

//  Config

#[derive(Debug, Clone, Default)]
pub struct Config {
    source: Option<PathBuf>,
    sections: Map<String, Value>,
}

impl Config {
    /// Parse a JSON document.  `path` is only used in error messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(sections) = value else {
            return Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
            });
        };
        Ok(Self {
            source: Some(path.to_path_buf()),
            sections,
        })
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// Load `requested`, or the first file found in the standard
    /// locations.  A missing file is not an error.
    pub fn discover(requested: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match requested {
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(path) => {
                error!("cannot find the requested config file: {}", path.display());
                None
            }
            None => lookup_config_file(&config_dirs()),
        };
        match file {
            Some(path) => {
                info!("reading config from file: {}", path.display());
                Self::load(&path)
            }
            None => {
                warn!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// File the configuration was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Raw content of section `name`.  Non-object sections are treated as
    /// empty.
    pub fn section_map(&self, name: &str) -> Map<String, Value> {
        match self.sections.get(name) {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                warn!("config section [{}] is not an object, ignored", name);
                Map::new()
            }
            None => Map::new(),
        }
    }

    pub fn section<T: ConfigSection>(&self, name: &str) -> T {
        load_section(name, &self.section_map(name))
    }

    /// Section names, in file order.  With a prefix, only `prefix` itself
    /// and its `prefix:<instance>` sections.
    pub fn sections(&self, prefix: Option<&str>) -> Vec<&str> {
        self.sections
            .keys()
            .map(String::as_str)
            .filter(|name| match prefix {
                None => true,
                Some(p) => {
                    *name == p || name.strip_prefix(p).is_some_and(|rest| rest.starts_with(':'))
                }
            })
            .collect()
    }

    pub fn general(&self) -> GeneralConfig {
        self.section("general")
    }

    pub fn socket(&self) -> SocketConfig {
        self.section("socket")
    }

    pub fn workspaces(&self) -> WorkspacesConfig {
        self.section("workspaces")
    }
}

/// `[general]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Panel modules to load, in order.
    pub modules: Vec<String>,
    /// Extra stylesheet for the UI.
    pub style: String,
    /// Whether the drop-down terminal is available.
    pub terminal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            style: String::new(),
            terminal: true,
        }
    }
}

impl ConfigSection for GeneralConfig {}

/// `[socket]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub path: Option<PathBuf>,
}

impl SocketConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_socket_path)
    }
}

impl ConfigSection for SocketConfig {
    fn validate(key: &str, value: &Value) -> Result<(), String> {
        match (key, value) {
            ("path", Value::String(p)) if !Path::new(p).is_absolute() => {
                Err(format!("socket path must be absolute, got {}", p))
            }
            _ => Ok(()),
        }
    }
}

/// `[workspaces]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspacesConfig {
    /// Backends to try, first match wins.
    pub backends: Vec<BackendKind>,
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Hyprland],
        }
    }
}

impl ConfigSection for WorkspacesConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Config {
        Config::parse(json, Path::new("test.json")).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        count: i64,
        ratio: f64,
        enabled: bool,
        names: Vec<String>,
        label: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                count: 3,
                ratio: 0.5,
                enabled: false,
                names: vec!["a".into()],
                label: "x".into(),
            }
        }
    }

    impl ConfigSection for Sample {
        fn validate(key: &str, value: &Value) -> Result<(), String> {
            if key == "count" && value.as_i64().is_some_and(|n| n < 0) {
                return Err("count must be positive".into());
            }
            Ok(())
        }
    }

    #[test]
    fn missing_section_uses_defaults() {
        let cfg = parse("{}");
        assert_eq!(cfg.section::<Sample>("sample"), Sample::default());
        assert_eq!(cfg.general(), GeneralConfig::default());
        assert_eq!(cfg.workspaces().backends, vec![BackendKind::Hyprland]);
    }

    #[test]
    fn typed_values_are_taken_as_is() {
        let cfg = parse(
            r#"{"sample": {"count": 7, "ratio": 1.5, "enabled": true,
                           "names": ["b", "c"], "label": "y"}}"#,
        );
        let s: Sample = cfg.section("sample");
        assert_eq!(
            s,
            Sample {
                count: 7,
                ratio: 1.5,
                enabled: true,
                names: vec!["b".into(), "c".into()],
                label: "y".into(),
            }
        );
    }

    #[test]
    fn strings_are_coerced() {
        let cfg = parse(
            r#"{"sample": {"count": "12", "ratio": "2.25", "enabled": "Yes",
                           "names": "one two  three"}}"#,
        );
        let s: Sample = cfg.section("sample");
        assert_eq!(s.count, 12);
        assert_eq!(s.ratio, 2.25);
        assert!(s.enabled);
        assert_eq!(s.names, vec!["one", "two", "three"]);
    }

    #[test]
    fn bool_coercion_is_strict_about_truthy_words() {
        for (text, expected) in [("true", true), ("1", true), ("YES", true), ("no", false), ("on", false)] {
            let cfg = parse(&format!(r#"{{"sample": {{"enabled": "{}"}}}}"#, text));
            assert_eq!(cfg.section::<Sample>("sample").enabled, expected, "{}", text);
        }
    }

    #[test]
    fn bad_fields_keep_defaults_and_others_still_load() {
        let cfg = parse(
            r#"{"sample": {"count": "many", "ratio": [1], "bogus": 1,
                           "label": null, "enabled": ""}}"#,
        );
        let s: Sample = cfg.section("sample");
        assert_eq!(s, Sample::default());

        let cfg = parse(r#"{"sample": {"count": "many", "label": "kept"}}"#);
        let s: Sample = cfg.section("sample");
        assert_eq!(s.count, 3);
        assert_eq!(s.label, "kept");
    }

    #[test]
    fn validator_rejects_value() {
        let cfg = parse(r#"{"sample": {"count": -4, "ratio": 0.1}}"#);
        let s: Sample = cfg.section("sample");
        assert_eq!(s.count, 3);
        assert_eq!(s.ratio, 0.1);
    }

    #[test]
    fn socket_path_defaults_and_validates() {
        let cfg = parse(r#"{"socket": {"path": "relative.sock"}}"#);
        assert_eq!(cfg.socket().path, None);
        assert!(cfg.socket().path().ends_with("aria-shell/cmd.sock"));

        let cfg = parse(r#"{"socket": {"path": "/run/aria.sock"}}"#);
        assert_eq!(cfg.socket().path(), PathBuf::from("/run/aria.sock"));
    }

    #[test]
    fn backends_from_string_or_list() {
        let cfg = parse(r#"{"workspaces": {"backends": "hyprland"}}"#);
        assert_eq!(cfg.workspaces().backends, vec![BackendKind::Hyprland]);

        let cfg = parse(r#"{"workspaces": {"backends": "sway"}}"#);
        assert_eq!(cfg.workspaces().backends, vec![BackendKind::Hyprland]);

        let cfg = parse(r#"{"workspaces": {"backends": []}}"#);
        assert!(cfg.workspaces().backends.is_empty());
    }

    #[test]
    fn general_terminal_switch() {
        let cfg = parse(r#"{"general": {"terminal": "no", "modules": "clock workspaces"}}"#);
        let general = cfg.general();
        assert!(!general.terminal);
        assert_eq!(general.modules, vec!["clock", "workspaces"]);
    }

    #[test]
    fn sections_by_prefix() {
        let cfg = parse(r#"{"panel": {}, "panel:top": {}, "panelx": {}, "general": {}, "panel:bottom": 3}"#);
        let mut panels = cfg.sections(Some("panel"));
        panels.sort_unstable();
        assert_eq!(panels, vec!["panel", "panel:bottom", "panel:top"]);
        assert_eq!(cfg.sections(None).len(), 5);
        assert!(cfg.section_map("panel:bottom").is_empty());
    }

    #[test]
    fn top_level_must_be_object() {
        assert!(matches!(
            Config::parse("[]", Path::new("x.json")),
            Err(ConfigError::NotAnObject { .. })
        ));
        assert!(matches!(
            Config::parse("{", Path::new("x.json")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_and_lookup_from_disk() {
        let dir = std::env::temp_dir().join(format!("aria-config-{}", std::process::id()));
        let conf_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&conf_dir).unwrap();
        let file = conf_dir.join(CONFIG_FILE);
        std::fs::write(&file, r#"{"general": {"style": "dark.css"}}"#).unwrap();

        let missing = dir.join("nowhere");
        assert_eq!(lookup_config_file(&[missing, dir.clone()]), Some(file.clone()));

        let cfg = Config::discover(Some(&file)).unwrap();
        assert_eq!(cfg.source(), Some(file.as_path()));
        assert_eq!(cfg.general().style, "dark.css");

        let cfg = Config::discover(Some(&dir.join("absent.json"))).unwrap();
        assert_eq!(cfg.source(), None);

        assert!(matches!(Config::load(&dir.join("absent.json")), Err(ConfigError::Read { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

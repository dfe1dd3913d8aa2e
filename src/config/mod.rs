use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use directories::BaseDirs;

/// Prefix for config keys that seed the runner's environment map.
const ENV_SEED_PREFIX: &str = "AIPY_ENV_";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        let mut map = default_map();

        // Read .aipyrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        tracing::debug!(path = %config_path.display(), keys = map.len(), "config loaded");
        Self { inner: map, config_path: config_path.to_path_buf() }
    }

    /// Build a config from explicit pairs on top of the defaults, ignoring the
    /// process environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned().filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn task_save_path(&self) -> PathBuf {
        self.get_path("TASK_SAVE_PATH").unwrap_or_else(|| PathBuf::from("."))
    }

    /// Environment map seeds: `AIPY_ENV_<NAME>=value` becomes entry `<NAME>`.
    pub fn env_seeds(&self) -> Vec<(String, String)> {
        let mut seeds: Vec<(String, String)> = self
            .inner
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_SEED_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect();
        seeds.sort();
        seeds
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or AIPY_*/OPENAI_* for forward-compat
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "DEFAULT_MODEL",
        "REQUEST_TIMEOUT",
        "MAX_TOKENS",
        "MAX_ROUNDS",
        "AUTO_INSTALL",
        "AUTO_GETENV",
        "INSTALL_COMMAND",
        "QPY_TMP",
        "QPY_LAUNCHER",
        "TASK_SAVE_PATH",
        "SYSTEM_PROMPT_PATH",
    ];

    KEYS.contains(&k) || k.starts_with("AIPY_") || k.starts_with("OPENAI_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("aipy").join(".aipyrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Numbers
    m.insert("REQUEST_TIMEOUT".into(), "120".into());
    m.insert("MAX_TOKENS".into(), "8192".into());
    m.insert("MAX_ROUNDS".into(), "16".into());

    // Strings
    m.insert("DEFAULT_MODEL".into(), "gpt-4o".into());
    m.insert("API_BASE_URL".into(), "default".into());

    // Bools as strings
    m.insert("AUTO_INSTALL".into(), "false".into());
    m.insert("AUTO_GETENV".into(), "false".into());

    m
}

use anyhow::Context;
use std::path::PathBuf;

pub const DEFAULT_THEME: &str = "#4A90E2";
pub const DEFAULT_TERM: &str = "Fall 2024";
pub const DEFAULT_LOG: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Seed file to load at startup; the built-in demo seed when unset.
    pub seed_path: Option<PathBuf>,
    pub log_filter: String,
    pub default_theme: String,
    pub term: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_path: None,
            log_filter: DEFAULT_LOG.to_string(),
            default_theme: DEFAULT_THEME.to_string(),
            term: DEFAULT_TERM.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut cfg = Config::default();
        if let Some(p) = non_empty("CLASSBRIDGE_SEED") {
            cfg.seed_path = Some(PathBuf::from(p));
        }
        if let Some(f) = non_empty("CLASSBRIDGE_LOG") {
            cfg.log_filter = f;
        }
        if let Some(t) = non_empty("CLASSBRIDGE_DEFAULT_THEME") {
            cfg.default_theme = parse_hex_color(&t)
                .with_context(|| format!("CLASSBRIDGE_DEFAULT_THEME={}", t))?;
        }
        if let Some(term) = non_empty("CLASSBRIDGE_TERM") {
            cfg.term = term;
        }
        Ok(cfg)
    }
}

/// Accepts `#RRGGBB` and returns it upper-cased.
pub fn parse_hex_color(raw: &str) -> anyhow::Result<String> {
    let t = raw.trim();
    let Some(hex) = t.strip_prefix('#') else {
        anyhow::bail!("color must start with '#'");
    };
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("color must be #RRGGBB");
    }
    Ok(format!("#{}", hex.to_ascii_uppercase()))
}

//! Configuration file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines. Strings are double-quoted,
//! numbers are bare, `#` starts a comment outside strings.
//!
//! ```text
//! venture = "acme"
//! site_url = "https://acme.example.com/"
//! download_url = "https://cdn.example.com/acme.zip"
//! mirror_urls = "https://stats.example.net/collect, https://m.example.org/e"
//! max_per_window = 3
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use url::Url;

/// Values read from the configuration file. Every field is optional; CLI
/// flags win over file values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub venture: Option<String>,
    pub site_url: Option<Url>,
    pub download_url: Option<Url>,
    pub analytics_path: Option<String>,
    pub mirror_urls: Vec<Url>,
    pub version: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Directory holding persisted gate state.
    pub state_dir: Option<PathBuf>,
    pub max_per_window: Option<u32>,
    pub window_ms: Option<u64>,
    pub verify_timeout_ms: Option<u64>,
}

impl FileConfig {
    /// Validates values against the ranges the gatekeeper accepts.
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_per_window
            && !(1..=1_000).contains(&max)
        {
            bail!("Invalid config value for `max_per_window`: {max}. Expected range: 1..=1000");
        }
        if let Some(window_ms) = self.window_ms
            && !(1_000..=86_400_000).contains(&window_ms)
        {
            bail!(
                "Invalid config value for `window_ms`: {window_ms}. Expected range: 1000..=86400000"
            );
        }
        if let Some(timeout) = self.verify_timeout_ms
            && !(100..=120_000).contains(&timeout)
        {
            bail!(
                "Invalid config value for `verify_timeout_ms`: {timeout}. Expected range: 100..=120000"
            );
        }
        if let Some(path) = &self.analytics_path
            && !path.starts_with('/')
        {
            bail!("Invalid config value for `analytics_path`: '{path}'. Expected an absolute path");
        }
        if self.venture.as_deref().is_some_and(str::is_empty) {
            bail!("Invalid config value for `venture`: must not be empty");
        }
        Ok(())
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/download-gate/config.toml`
/// 2. `$HOME/.config/download-gate/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("download-gate")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("download-gate")
            .join("config.toml"),
    )
}

/// Resolves the default state directory.
///
/// Priority:
/// 1. `$XDG_STATE_HOME/download-gate`
/// 2. `$HOME/.local/state/download-gate`
/// 3. `./.download-gate`
#[must_use]
pub fn resolve_default_state_dir() -> PathBuf {
    if let Some(xdg_state_home) = env_var_non_empty_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state_home).join("download-gate");
    }
    env_var_non_empty_os("HOME").map_or_else(
        || PathBuf::from(".download-gate"),
        |home| {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("download-gate")
        },
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` if given (must exist), else from the default
/// path if present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    read_file_config(&path).map(Some)
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;

        match key {
            "venture" => cfg.venture = Some(string_field(key, value, line_no)?),
            "site_url" => cfg.site_url = Some(url_field(key, value, line_no)?),
            "download_url" => cfg.download_url = Some(url_field(key, value, line_no)?),
            "analytics_path" => cfg.analytics_path = Some(string_field(key, value, line_no)?),
            "mirror_urls" => {
                let list = string_field(key, value, line_no)?;
                cfg.mirror_urls = list
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| {
                        Url::parse(item).with_context(|| {
                            format!("Invalid URL '{item}' in `mirror_urls` on line {line_no}")
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            "version" => cfg.version = Some(string_field(key, value, line_no)?),
            "output_dir" => cfg.output_dir = Some(PathBuf::from(string_field(key, value, line_no)?)),
            "state_dir" => cfg.state_dir = Some(PathBuf::from(string_field(key, value, line_no)?)),
            "max_per_window" => {
                let parsed = integer_field(key, value, line_no)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_per_window out of range for u32"))?;
                cfg.max_per_window = Some(n);
            }
            "window_ms" => cfg.window_ms = Some(integer_field(key, value, line_no)?),
            "verify_timeout_ms" => {
                cfg.verify_timeout_ms = Some(integer_field(key, value, line_no)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn string_field(key: &str, value: &str, line_no: usize) -> Result<String> {
    parse_string_literal(value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))
}

fn url_field(key: &str, value: &str, line_no: usize) -> Result<Url> {
    let raw = string_field(key, value, line_no)?;
    Url::parse(&raw).with_context(|| format!("Invalid URL for `{key}` on line {line_no}"))
}

fn integer_field(key: &str, value: &str, line_no: usize) -> Result<u64> {
    parse_integer_u64(value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_full_file() {
        let cfg = parse_config_str(
            r#"
            # site
            venture = "acme"
            site_url = "https://acme.example.com/"   # trailing comment
            download_url = "https://cdn.example.com/acme.zip"
            analytics_path = "/collect"
            mirror_urls = "https://a.example.net/e, https://b.example.org/e"
            version = "2.4.1"
            output_dir = "/tmp/downloads"
            state_dir = "/tmp/state"
            max_per_window = 5
            window_ms = 30000
            verify_timeout_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.venture.as_deref(), Some("acme"));
        assert_eq!(
            cfg.site_url.as_ref().map(Url::as_str),
            Some("https://acme.example.com/")
        );
        assert_eq!(cfg.analytics_path.as_deref(), Some("/collect"));
        assert_eq!(cfg.mirror_urls.len(), 2);
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/downloads")));
        assert_eq!(cfg.max_per_window, Some(5));
        assert_eq!(cfg.window_ms, Some(30_000));
        assert_eq!(cfg.verify_timeout_ms, Some(2_500));
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str("venture = \"acme\"\n").unwrap();
        assert_eq!(cfg.venture.as_deref(), Some("acme"));
        assert!(cfg.site_url.is_none());
        assert!(cfg.mirror_urls.is_empty());
    }

    #[test]
    fn test_hash_inside_string_is_not_a_comment() {
        let cfg = parse_config_str("site_url = \"https://acme.example.com/#top\"").unwrap();
        assert_eq!(
            cfg.site_url.map(|u| u.fragment().map(str::to_string)),
            Some(Some("top".to_string()))
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_config_str("concurrency = 4").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_missing_equals_rejected() {
        let err = parse_config_str("venture \"acme\"").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_unquoted_string_rejected() {
        assert!(parse_config_str("venture = acme").is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        assert!(parse_config_str("max_per_window = 0").is_err());
        assert!(parse_config_str("window_ms = 10").is_err());
        assert!(parse_config_str("verify_timeout_ms = 500000").is_err());
        assert!(parse_config_str("window_ms = -1").is_err());
    }

    #[test]
    fn test_relative_analytics_path_rejected() {
        let err = parse_config_str("analytics_path = \"api/analytics\"").unwrap_err();
        assert!(err.to_string().contains("analytics_path"));
    }

    #[test]
    fn test_bad_mirror_url_rejected() {
        assert!(parse_config_str("mirror_urls = \"https://ok.example.com, not a url\"").is_err());
    }
}

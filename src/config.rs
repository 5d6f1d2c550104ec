/*
 *  config.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML file, command line
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::backlight::DEFAULT_TIMEOUT_TICKS;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DEVICE: &str = "/dev/fb0";
pub const DEFAULT_FONT: &str = "sen.ttf";
pub const DEFAULT_PLACEHOLDER: &str = "/albumart";
pub const DEFAULT_ARTWORK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_BASE_MS: u64 = 2_000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 60_000;
pub const DEFAULT_MAX_JITTER_MS: u64 = 50;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>, // e.g., "info" | "debug"
    pub server: Option<ServerConfig>,
    pub display: Option<DisplayConfig>,
    pub backlight: Option<BacklightConfig>,
    pub artwork: Option<ArtworkConfig>,
    pub dedup: Option<DedupConfig>,
}

/// Where the media service lives.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayConfig {
    /// /dev/fbN, or snapshot:<file.png>
    pub device: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub font: Option<PathBuf>,
    pub rotate_overlay: Option<bool>,
    pub placeholder_art: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BacklightConfig {
    pub pin: Option<u8>, // BCM numbering
    pub sysfs_path: Option<PathBuf>,
    pub timeout_ticks: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ArtworkConfig {
    pub timeout_ms: Option<u64>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DedupConfig {
    pub max_jitter_ms: Option<u64>,
}

impl Config {
    /// Built-in defaults, the bottom layer.
    pub fn with_defaults() -> Self {
        Config {
            log_level: None,
            server: Some(ServerConfig {
                host: Some(DEFAULT_HOST.to_string()),
                port: Some(DEFAULT_PORT),
            }),
            display: Some(DisplayConfig {
                device: Some(DEFAULT_DEVICE.to_string()),
                width: None,
                height: None,
                font: Some(PathBuf::from(DEFAULT_FONT)),
                rotate_overlay: Some(true),
                placeholder_art: Some(DEFAULT_PLACEHOLDER.to_string()),
            }),
            backlight: Some(BacklightConfig {
                pin: None,
                sysfs_path: None,
                timeout_ticks: Some(DEFAULT_TIMEOUT_TICKS),
            }),
            artwork: Some(ArtworkConfig {
                timeout_ms: Some(DEFAULT_ARTWORK_TIMEOUT_MS),
                retry_base_ms: Some(DEFAULT_RETRY_BASE_MS),
                retry_max_ms: Some(DEFAULT_RETRY_MAX_MS),
            }),
            dedup: Some(DedupConfig {
                max_jitter_ms: Some(DEFAULT_MAX_JITTER_MS),
            }),
        }
    }

    pub fn host(&self) -> &str {
        self.server.as_ref().and_then(|s| s.host.as_deref()).unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn device(&self) -> &str {
        self.display.as_ref().and_then(|d| d.device.as_deref()).unwrap_or(DEFAULT_DEVICE)
    }

    pub fn display_size(&self) -> (Option<u32>, Option<u32>) {
        self.display.as_ref().map(|d| (d.width, d.height)).unwrap_or((None, None))
    }

    pub fn font(&self) -> &Path {
        self.display
            .as_ref()
            .and_then(|d| d.font.as_deref())
            .unwrap_or(Path::new(DEFAULT_FONT))
    }

    pub fn rotate_overlay(&self) -> bool {
        self.display.as_ref().and_then(|d| d.rotate_overlay).unwrap_or(true)
    }

    pub fn placeholder_art(&self) -> &str {
        self.display
            .as_ref()
            .and_then(|d| d.placeholder_art.as_deref())
            .unwrap_or(DEFAULT_PLACEHOLDER)
    }

    pub fn backlight_pin(&self) -> Option<u8> {
        self.backlight.as_ref().and_then(|b| b.pin)
    }

    pub fn backlight_sysfs(&self) -> Option<&Path> {
        self.backlight.as_ref().and_then(|b| b.sysfs_path.as_deref())
    }

    pub fn backlight_timeout_ticks(&self) -> i32 {
        self.backlight.as_ref().and_then(|b| b.timeout_ticks).unwrap_or(DEFAULT_TIMEOUT_TICKS)
    }

    pub fn artwork_timeout(&self) -> Duration {
        Duration::from_millis(
            self.artwork.as_ref().and_then(|a| a.timeout_ms).unwrap_or(DEFAULT_ARTWORK_TIMEOUT_MS),
        )
    }

    pub fn artwork_retry(&self) -> (Duration, Duration) {
        let a = self.artwork.as_ref();
        (
            Duration::from_millis(a.and_then(|a| a.retry_base_ms).unwrap_or(DEFAULT_RETRY_BASE_MS)),
            Duration::from_millis(a.and_then(|a| a.retry_max_ms).unwrap_or(DEFAULT_RETRY_MAX_MS)),
        )
    }

    pub fn max_jitter_ms(&self) -> u64 {
        self.dedup.as_ref().and_then(|d| d.max_jitter_ms).unwrap_or(DEFAULT_MAX_JITTER_MS)
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "nowframe", about = "Now playing on a framebuffer", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// media service host
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// /dev/fbN or snapshot:<file.png>
    #[arg(long)]
    pub device: Option<String>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub font: Option<PathBuf>,
    #[arg(long)]
    pub backlight_pin: Option<u8>,
    #[arg(long, action = ArgAction::Set)]
    pub rotate_overlay: Option<bool>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: read YAML, merge, apply CLI, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults
    let mut cfg = Config::with_defaults();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Pretty YAML of effective config
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/nowframe/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/nowframe/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/nowframe.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["nowframe.yaml", "config.yaml", "config/nowframe.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Merge one Option-of-group into another, field by field.
fn merge_group<T>(dst: &mut Option<T>, src: Option<T>, merge_fields: fn(&mut T, T)) {
    match (dst.as_mut(), src) {
        (None, Some(s)) => *dst = Some(s),
        (Some(d), Some(s)) => merge_fields(d, s),
        _ => {}
    }
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    merge_group(&mut dst.server, src.server, merge_server);
    merge_group(&mut dst.display, src.display, merge_display);
    merge_group(&mut dst.backlight, src.backlight, merge_backlight);
    merge_group(&mut dst.artwork, src.artwork, merge_artwork);
    merge_group(&mut dst.dedup, src.dedup, merge_dedup);
}

fn merge_server(dst: &mut ServerConfig, src: ServerConfig) {
    if src.host.is_some() { dst.host = src.host; }
    if src.port.is_some() { dst.port = src.port; }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.device.is_some()          { dst.device = src.device; }
    if src.width.is_some()           { dst.width = src.width; }
    if src.height.is_some()          { dst.height = src.height; }
    if src.font.is_some()            { dst.font = src.font; }
    if src.rotate_overlay.is_some()  { dst.rotate_overlay = src.rotate_overlay; }
    if src.placeholder_art.is_some() { dst.placeholder_art = src.placeholder_art; }
}

fn merge_backlight(dst: &mut BacklightConfig, src: BacklightConfig) {
    if src.pin.is_some()           { dst.pin = src.pin; }
    if src.sysfs_path.is_some()    { dst.sysfs_path = src.sysfs_path; }
    if src.timeout_ticks.is_some() { dst.timeout_ticks = src.timeout_ticks; }
}

fn merge_artwork(dst: &mut ArtworkConfig, src: ArtworkConfig) {
    if src.timeout_ms.is_some()    { dst.timeout_ms = src.timeout_ms; }
    if src.retry_base_ms.is_some() { dst.retry_base_ms = src.retry_base_ms; }
    if src.retry_max_ms.is_some()  { dst.retry_max_ms = src.retry_max_ms; }
}

fn merge_dedup(dst: &mut DedupConfig, src: DedupConfig) {
    if src.max_jitter_ms.is_some() { dst.max_jitter_ms = src.max_jitter_ms; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() { cfg.log_level = cli.log_level.clone(); }

    let server = cfg.server.get_or_insert_with(ServerConfig::default);
    if cli.host.is_some() { server.host = cli.host.clone(); }
    if cli.port.is_some() { server.port = cli.port; }

    let display = cfg.display.get_or_insert_with(DisplayConfig::default);
    if cli.device.is_some()         { display.device = cli.device.clone(); }
    if cli.width.is_some()          { display.width = cli.width; }
    if cli.height.is_some()         { display.height = cli.height; }
    if cli.font.is_some()           { display.font = cli.font.clone(); }
    if cli.rotate_overlay.is_some() { display.rotate_overlay = cli.rotate_overlay; }

    if cli.backlight_pin.is_some() {
        cfg.backlight.get_or_insert_with(BacklightConfig::default).pin = cli.backlight_pin;
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.port() == 0 {
        return Err(ConfigError::Validation("server port must be > 0".into()));
    }
    if cfg.host().trim().is_empty() {
        return Err(ConfigError::Validation("server host must not be empty".into()));
    }
    let (w, h) = cfg.display_size();
    if w == Some(0) || h == Some(0) {
        return Err(ConfigError::Validation("display width/height must be > 0".into()));
    }
    if cfg.backlight_timeout_ticks() <= 0 {
        return Err(ConfigError::Validation("backlight timeout_ticks must be > 0".into()));
    }
    let (base, max) = cfg.artwork_retry();
    if base.is_zero() || base > max {
        return Err(ConfigError::Validation(
            "artwork retry_base_ms must be > 0 and <= retry_max_ms".into(),
        ));
    }
    if cfg.artwork_timeout().is_zero() {
        return Err(ConfigError::Validation("artwork timeout_ms must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_yaml(name: &str, body: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!("nowframe-{}-{}.yaml", name, std::process::id()));
        fs::write(&p, body).unwrap();
        p
    }

    fn cli_with(path: &Path) -> Cli {
        Cli { config: Some(path.to_path_buf()), ..Default::default() }
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::with_defaults();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.host(), "localhost");
        assert_eq!(cfg.port(), 3000);
        assert_eq!(cfg.device(), "/dev/fb0");
        assert_eq!(cfg.font(), Path::new("sen.ttf"));
        assert!(cfg.rotate_overlay());
        assert_eq!(cfg.placeholder_art(), "/albumart");
        assert_eq!(cfg.backlight_timeout_ticks(), 60);
        assert_eq!(cfg.backlight_pin(), None);
        assert_eq!(cfg.artwork_retry(), (Duration::from_secs(2), Duration::from_secs(60)));
        assert_eq!(cfg.max_jitter_ms(), 50);
    }

    #[test]
    fn test_yaml_layers_over_defaults() {
        let p = write_yaml(
            "layer",
            "server:\n  host: volumio.local\ndisplay:\n  rotate_overlay: false\nbacklight:\n  pin: 18\n",
        );
        let cfg = load(&cli_with(&p)).unwrap();
        assert_eq!(cfg.host(), "volumio.local");
        // untouched keys in a partially given group keep their defaults
        assert_eq!(cfg.port(), 3000);
        assert_eq!(cfg.device(), "/dev/fb0");
        assert!(!cfg.rotate_overlay());
        assert_eq!(cfg.backlight_pin(), Some(18));
        assert_eq!(cfg.backlight_timeout_ticks(), 60);
        let _ = fs::remove_file(p);
    }

    #[test]
    fn test_cli_beats_yaml() {
        let p = write_yaml("cli", "server:\n  port: 8080\ndisplay:\n  device: /dev/fb1\n");
        let cli = Cli {
            port: Some(3001),
            rotate_overlay: Some(false),
            backlight_pin: Some(12),
            ..cli_with(&p)
        };
        let cfg = load(&cli).unwrap();
        assert_eq!(cfg.port(), 3001);
        assert_eq!(cfg.device(), "/dev/fb1");
        assert!(!cfg.rotate_overlay());
        assert_eq!(cfg.backlight_pin(), Some(12));
        let _ = fs::remove_file(p);
    }

    #[test]
    fn test_validation() {
        let p = write_yaml("bad", "artwork:\n  retry_base_ms: 90000\n");
        assert!(matches!(load(&cli_with(&p)), Err(ConfigError::Validation(_))));
        let _ = fs::remove_file(p);

        let p = write_yaml("zero", "display:\n  width: 0\n  height: 240\n");
        assert!(matches!(load(&cli_with(&p)), Err(ConfigError::Validation(_))));
        let _ = fs::remove_file(p);

        let p = write_yaml("ticks", "backlight:\n  timeout_ticks: 0\n");
        assert!(load(&cli_with(&p)).is_err());
        let _ = fs::remove_file(p);
    }

    #[test]
    fn test_missing_explicit_file() {
        let cli = cli_with(Path::new("/nonexistent/nowframe.yaml"));
        assert!(matches!(load(&cli), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_bad_yaml() {
        let p = write_yaml("syntax", "server: [unclosed\n");
        assert!(matches!(load(&cli_with(&p)), Err(ConfigError::Yaml(_))));
        let _ = fs::remove_file(p);
    }

    #[test]
    fn test_dump_roundtrips() {
        let cfg = Config::with_defaults();
        let text = dump(&cfg).unwrap();
        assert!(text.contains("rotate_overlay: true"));
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "nowframe", "--debug", "--host", "10.0.0.5", "--rotate-overlay", "false", "--device", "snapshot:/tmp/a.png",
        ]);
        assert!(cli.debug);
        assert_eq!(cli.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(cli.rotate_overlay, Some(false));
        assert_eq!(cli.device.as_deref(), Some("snapshot:/tmp/a.png"));
    }
}

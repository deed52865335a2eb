use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::model::Model;
use crate::persona::Persona;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 2.0;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS_MIN: u32 = 100;
pub const MAX_TOKENS_MAX: u32 = 4000;
pub const MAX_TOKENS_STEP: u32 = 100;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Persisted user preferences and the local secrets store.
///
/// Every field is optional so that hand-edited or older files still load.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("persona-chat").join("config.json"))
    }

    pub fn persona(&self) -> Persona {
        self.persona
            .as_deref()
            .and_then(Persona::from_key)
            .unwrap_or_default()
    }

    pub fn model_params(&self) -> ModelParams {
        let model = self.model
            .as_deref()
            .and_then(Model::from_str)
            .unwrap_or_default();

        ModelParams::new(
            model,
            self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        )
    }

    /// Remember the slider and picker positions for the next run.
    pub fn remember_params(&mut self, params: &ModelParams) {
        self.model = Some(params.model.as_str().to_string());
        self.temperature = Some(params.temperature);
        self.max_tokens = Some(params.max_tokens);
    }

    pub fn base_url(&self) -> String {
        std::env::var(BASE_URL_ENV).ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Where saved chat histories go: configured directory, then the user's
    /// downloads folder, then the working directory.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Generation parameters for one request, as set by the picker and sliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub model: Model,
    /// Always on the 0.1 grid within [0.0, 2.0]
    pub temperature: f32,
    /// Always a multiple of 100 within [100, 4000]
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self::new(Model::default(), DEFAULT_TEMPERATURE, DEFAULT_MAX_TOKENS)
    }
}

impl ModelParams {
    /// Values outside the slider ranges are clamped, never rejected.
    pub fn new(model: Model, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            temperature: snap_temperature(temperature),
            max_tokens: snap_max_tokens(max_tokens),
        }
    }

    pub fn raise_temperature(&mut self) {
        self.temperature = temperature_from_tenths(temperature_tenths(self.temperature) + 1);
    }

    pub fn lower_temperature(&mut self) {
        self.temperature = temperature_from_tenths(temperature_tenths(self.temperature) - 1);
    }

    pub fn raise_max_tokens(&mut self) {
        self.max_tokens = snap_max_tokens(self.max_tokens.saturating_add(MAX_TOKENS_STEP));
    }

    pub fn lower_max_tokens(&mut self) {
        self.max_tokens = snap_max_tokens(self.max_tokens.saturating_sub(MAX_TOKENS_STEP));
    }
}

fn temperature_tenths(value: f32) -> i32 {
    if value.is_nan() {
        return (DEFAULT_TEMPERATURE * 10.0).round() as i32;
    }
    (value.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX) * 10.0).round() as i32
}

fn temperature_from_tenths(tenths: i32) -> f32 {
    let max = (TEMPERATURE_MAX * 10.0) as i32;
    tenths.clamp(0, max) as f32 / 10.0
}

fn snap_temperature(value: f32) -> f32 {
    temperature_from_tenths(temperature_tenths(value))
}

fn snap_max_tokens(value: u32) -> u32 {
    let rounded = value.saturating_add(MAX_TOKENS_STEP / 2) / MAX_TOKENS_STEP * MAX_TOKENS_STEP;
    rounded.clamp(MAX_TOKENS_MIN, MAX_TOKENS_MAX)
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(
        "OpenAI API key is not configured.\n\n\
         To run locally, export it in your shell:\n    export {env}=your-api-key\n\n\
         Or store it in the config file {path}:\n    {{ \"openai_api_key\": \"your-api-key\" }}"
    )]
    Missing { env: &'static str, path: String },
}

/// Pick the API credential: environment variable first, config file second.
/// Blank values count as absent.
pub fn resolve_api_key(
    env_value: Option<String>,
    config: &Config,
    config_path: &Path,
) -> Result<String, CredentialError> {
    env_value
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config.openai_api_key.clone().filter(|k| !k.trim().is_empty()))
        .map(|k| k.trim().to_string())
        .ok_or_else(|| CredentialError::Missing {
            env: API_KEY_ENV,
            path: config_path.display().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = Config::new().model_params();
        assert_eq!(params.model, Model::Gpt4oMini);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 1000);
        assert_eq!(Config::new().persona(), Persona::General);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let params = ModelParams::new(Model::Gpt4o, 3.7, 50);
        assert_eq!(params.temperature, 2.0);
        assert_eq!(params.max_tokens, 100);

        let params = ModelParams::new(Model::Gpt4o, -1.0, 9000);
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 4000);

        let params = ModelParams::new(Model::Gpt4o, 0.74, 1249);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 1200);
    }

    #[test]
    fn test_slider_steps_saturate() {
        let mut params = ModelParams::new(Model::Gpt4oMini, 1.9, 3900);
        params.raise_temperature();
        assert_eq!(params.temperature, 2.0);
        params.raise_temperature();
        assert_eq!(params.temperature, 2.0);
        params.raise_max_tokens();
        params.raise_max_tokens();
        assert_eq!(params.max_tokens, 4000);

        let mut params = ModelParams::new(Model::Gpt4oMini, 0.1, 200);
        params.lower_temperature();
        params.lower_temperature();
        assert_eq!(params.temperature, 0.0);
        params.lower_max_tokens();
        params.lower_max_tokens();
        assert_eq!(params.max_tokens, 100);
    }

    #[test]
    fn test_temperature_steps_stay_on_grid() {
        let mut params = ModelParams::default();
        for _ in 0..5 {
            params.raise_temperature();
        }
        assert_eq!(params.temperature, 1.2);
    }

    #[test]
    fn test_env_key_wins_over_config() {
        let config = Config {
            openai_api_key: Some("from-config".to_string()),
            ..Config::new()
        };
        let key = resolve_api_key(Some("from-env".to_string()), &config, Path::new("c.json")).unwrap();
        assert_eq!(key, "from-env");

        let key = resolve_api_key(Some("  ".to_string()), &config, Path::new("c.json")).unwrap();
        assert_eq!(key, "from-config");
    }

    #[test]
    fn test_missing_key_explains_both_paths() {
        let err = resolve_api_key(None, &Config::new(), Path::new("/tmp/pc/config.json")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("export OPENAI_API_KEY="));
        assert!(message.contains("/tmp/pc/config.json"));
        assert!(message.contains("openai_api_key"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.persona = Some(Persona::Chef.key().to_string());
        config.remember_params(&ModelParams::new(Model::Gpt35Turbo, 1.3, 2500));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.persona(), Persona::Chef);
        assert_eq!(loaded.model_params(), ModelParams::new(Model::Gpt35Turbo, 1.3, 2500));
        assert!(loaded.openai_api_key.is_none());
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.model.is_none());
    }
}

use anyhow::{Context, Result};
use facegate_vision::{
    build_source, DescriptorConfig, ExtractorKind, FaceLocator, ModelConfig, Pipeline,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_CONFIG_PATH").unwrap_or("/usr/local/etc/facegate/config.toml"))
});

pub static FACE_STORE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_STORE_PREFIX").unwrap_or("/usr/local/etc/facegate"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: f32,
    pub extractor: ExtractorKind,
    pub store_dir: PathBuf,
    pub padding: u32,
    pub descriptor: DescriptorSection,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorSection {
    pub canonical_size: u32,
    pub grid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: facegate_vision::DEFAULT_THRESHOLD,
            extractor: ExtractorKind::Auto,
            store_dir: FACE_STORE_PREFIX.to_path_buf(),
            padding: facegate_vision::pipeline::DEFAULT_PADDING,
            descriptor: DescriptorSection::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for DescriptorSection {
    fn default() -> Self {
        Self {
            canonical_size: facegate_vision::descriptor::CANONICAL_SIZE,
            grid: facegate_vision::descriptor::GRID,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold {} is outside [-1, 1]", self.threshold);
        }
        self.descriptor_config()?;
        Ok(())
    }

    pub fn descriptor_config(&self) -> Result<DescriptorConfig> {
        DescriptorConfig::new(self.descriptor.canonical_size, self.descriptor.grid)
            .context("invalid [descriptor] section")
    }

    /// Build the extraction pipeline once; the extractor is fixed from here on.
    pub fn build_pipeline(&self, locator: Box<dyn FaceLocator>) -> Result<Pipeline> {
        let source = build_source(self.extractor, self.descriptor_config()?, &self.model)
            .context("initializing embedding extractor")?;
        log::debug!("using {} extractor", source.name());
        Ok(Pipeline::new(locator, source).with_padding(self.padding))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

//! Named configuration templates served by the service.
//!
//! The catalog is fetched at most once per [`PresetCatalog`] instance and is
//! read-only afterwards. To pick up server-side changes, build a new catalog.
//! [`PresetCatalog::get`] always hands out a clone, so editing an applied
//! preset never reaches back into the catalog.

use super::shape::from_wire;
use super::ConfigModel;
use crate::error::{ClientError, ConfigError};
use crate::service::ConversionService;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// One named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub description: Option<String>,
    pub config: ConfigModel,
}

/// Read-through cache of [`Preset`]s.
#[derive(Debug, Default)]
pub struct PresetCatalog {
    presets: OnceCell<Vec<Preset>>,
}

impl PresetCatalog {
    /// An empty, unloaded catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog that is already loaded with `presets`.
    pub fn from_presets(presets: Vec<Preset>) -> Self {
        Self {
            presets: OnceCell::new_with(Some(presets)),
        }
    }

    /// Fetch the presets from `service` on first call; return the cached list
    /// on every later call.
    ///
    /// Entries whose configuration cannot be parsed are skipped with a
    /// warning, as are duplicate names after the first. A failed fetch leaves
    /// the catalog unloaded so the next call retries.
    pub async fn load(&self, service: &dyn ConversionService) -> Result<&[Preset], ClientError> {
        let presets = self
            .presets
            .get_or_try_init(|| async {
                let entries = service.presets().await?;
                let mut presets: Vec<Preset> = Vec::with_capacity(entries.len());
                for entry in entries {
                    if presets.iter().any(|p| p.name == entry.name) {
                        warn!("Duplicate preset '{}' ignored", entry.name);
                        continue;
                    }
                    match from_wire(&entry.config) {
                        Ok((config, _)) => presets.push(Preset {
                            name: entry.name,
                            description: entry.description,
                            config,
                        }),
                        Err(e) => warn!("Skipping preset '{}': {e}", entry.name),
                    }
                }
                info!("Loaded {} configuration presets", presets.len());
                Ok::<_, ClientError>(presets)
            })
            .await?;
        Ok(presets.as_slice())
    }

    pub fn is_loaded(&self) -> bool {
        self.presets.initialized()
    }

    /// The loaded presets, or `None` before [`load`](Self::load) succeeded.
    pub fn presets(&self) -> Option<&[Preset]> {
        self.presets.get().map(Vec::as_slice)
    }

    /// An independent copy of the named template's configuration.
    pub fn get(&self, name: &str) -> Result<ConfigModel, ConfigError> {
        let presets = self.presets.get().ok_or(ConfigError::CatalogNotLoaded)?;
        presets
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.config.clone())
            .ok_or_else(|| ConfigError::PresetNotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets()
            .map(|ps| ps.iter().map(|p| p.name.as_str()).collect())
            .unwrap_or_default()
    }
}

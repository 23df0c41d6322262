//! Read-only inventory of the asset store against the catalog and the guide.
//!
//! Answers the questions `generate-images` would act on, without acting:
//! which catalog images are present, which are failure placeholders, which
//! could be converted from a legacy file, and which are missing. Also lists
//! store files nothing refers to and guide images no catalog entry covers.

use crate::assets::{AssetError, AssetStore};
use crate::config::GuideConfig;
use crate::guide::Guide;
use crate::imaging::is_placeholder;
use serde::Serialize;

/// State of one catalog image in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetState {
    Present { fingerprint: String },
    /// Present, but it is the failure placeholder.
    Placeholder,
    /// Missing, with a legacy file the pipeline would convert.
    Legacy { source: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetReport {
    pub filename: String,
    pub state: AssetState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub assets: Vec<AssetReport>,
    /// Store files that are neither catalog images nor their legacy variants.
    pub orphans: Vec<String>,
    /// Images the guide shows that no catalog entry generates.
    pub uncatalogued: Vec<String>,
}

impl Inventory {
    pub fn count(&self, pred: impl Fn(&AssetState) -> bool) -> usize {
        self.assets.iter().filter(|a| pred(&a.state)).count()
    }
}

pub fn survey(
    config: &GuideConfig,
    store: &AssetStore,
    guide: &Guide,
) -> Result<Inventory, AssetError> {
    let mut inventory = Inventory::default();
    let mut known: Vec<String> = Vec::new();

    for descriptor in &config.assets {
        let filename = &descriptor.filename;
        known.push(filename.clone());
        let legacy: Vec<String> = config
            .images
            .legacy_extensions
            .iter()
            .map(|ext| descriptor.with_extension(ext))
            .filter(|name| name != filename)
            .collect();
        known.extend(legacy.iter().cloned());

        let state = if store.exists(filename) {
            let bytes = store.read(filename)?;
            if is_placeholder(&bytes) {
                AssetState::Placeholder
            } else {
                AssetState::Present {
                    fingerprint: crate::assets::fingerprint_bytes(&bytes),
                }
            }
        } else if let Some(source) = legacy.into_iter().find(|name| store.exists(name)) {
            AssetState::Legacy { source }
        } else {
            AssetState::Missing
        };
        inventory.assets.push(AssetReport {
            filename: filename.clone(),
            state,
        });
    }

    inventory.orphans = store
        .list()?
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect();
    inventory.uncatalogued = guide
        .referenced_images()
        .into_iter()
        .filter(|name| !config.assets.iter().any(|d| d.filename == *name))
        .collect();

    Ok(inventory)
}

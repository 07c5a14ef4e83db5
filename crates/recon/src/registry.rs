use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::RegistryEntry;
use crate::normalize::CompositeKey;

/// Exact-match lookup from (county, subdivision, village) to village code.
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    by_key: HashMap<CompositeKey, String>,
    overwritten: usize,
}

impl RegistryIndex {
    /// Build the index. A repeated triple replaces the earlier code.
    pub fn build(entries: &[RegistryEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let key = CompositeKey::new(&entry.county, &entry.subdivision, &entry.village);
            if let Some(previous) = index.by_key.insert(key, entry.villcode.clone()) {
                index.overwritten += 1;
                log::debug!(
                    "registry: {}|{}|{} code {previous} replaced by {}",
                    entry.county,
                    entry.subdivision,
                    entry.village,
                    entry.villcode
                );
            }
        }
        index
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of entries that replaced an earlier entry with the same triple.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct FeatureCollection {
    features: Option<Vec<Feature>>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<VillageProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct VillageProperties {
    #[serde(default)]
    countyname: Option<String>,
    #[serde(default)]
    townname: Option<String>,
    #[serde(default)]
    villname: Option<String>,
    #[serde(default)]
    villcode: Option<String>,
}

impl VillageProperties {
    fn into_entry(self) -> Option<RegistryEntry> {
        let villcode = self.villcode.filter(|c| !c.trim().is_empty())?;
        Some(RegistryEntry {
            county: self.countyname.unwrap_or_default(),
            subdivision: self.townname.unwrap_or_default(),
            village: self.villname.unwrap_or_default(),
            villcode: villcode.trim().to_string(),
        })
    }
}

/// Read registry entries from a village-boundary GeoJSON FeatureCollection.
///
/// Only `properties` are read; geometry is ignored. Features without a
/// village code are skipped.
pub fn from_geojson(input: &str) -> Result<Vec<RegistryEntry>, ReconError> {
    let collection: FeatureCollection =
        serde_json::from_str(input).map_err(|e| ReconError::json("registry", e))?;
    let features = collection
        .features
        .ok_or_else(|| ReconError::InvalidRegistry("document has no 'features' array".into()))?;

    let total = features.len();
    let entries: Vec<RegistryEntry> = features
        .into_iter()
        .filter_map(|f| f.properties.and_then(VillageProperties::into_entry))
        .collect();

    if entries.len() < total {
        log::warn!(
            "registry: skipped {} feature(s) without a village code",
            total - entries.len()
        );
    }
    Ok(entries)
}

/// Read registry entries from CSV with `COUNTYNAME,TOWNNAME,VILLNAME,VILLCODE` headers.
pub fn from_csv(input: &str) -> Result<Vec<RegistryEntry>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, ReconError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconError::InvalidRegistry(format!("missing column '{name}'")))
    };

    let county_idx = idx("COUNTYNAME")?;
    let town_idx = idx("TOWNNAME")?;
    let village_idx = idx("VILLNAME")?;
    let code_idx = idx("VILLCODE")?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::Csv(e.to_string()))?;
        let villcode = record.get(code_idx).unwrap_or("").trim();
        if villcode.is_empty() {
            continue;
        }
        entries.push(RegistryEntry {
            county: record.get(county_idx).unwrap_or("").to_string(),
            subdivision: record.get(town_idx).unwrap_or("").to_string(),
            village: record.get(village_idx).unwrap_or("").to_string(),
            villcode: villcode.to_string(),
        });
    }

    Ok(entries)
}

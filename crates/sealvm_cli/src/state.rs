//! JSON state file backing `sealvm run`.
//!
//! A flat object of hex key to hex value.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use sealvm_storage::MemoryStore;
use std::collections::BTreeMap;
use std::path::Path;

/// Load a store from `path`; a missing file is an empty store
pub fn load(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read state {}", path.display()))?;
    let entries: BTreeMap<String, String> = serde_json::from_str(&text)
        .wrap_err_with(|| format!("Invalid state {}", path.display()))?;
    let mut records = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let key = hex::decode(&key).map_err(|e| eyre!("Invalid key {:?}: {}", key, e))?;
        let value = hex::decode(&value).map_err(|e| eyre!("Invalid value {:?}: {}", value, e))?;
        records.push((key, value));
    }
    Ok(MemoryStore::from_records(records))
}

/// Write every record of `store` to `path`
pub fn save(path: &Path, store: &MemoryStore) -> Result<()> {
    let entries: BTreeMap<String, String> = store
        .records()
        .into_iter()
        .map(|(key, value)| (hex::encode(key), hex::encode(value)))
        .collect();
    let text = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, text).wrap_err_with(|| format!("Failed to write state {}", path.display()))
}

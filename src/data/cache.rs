use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::loader::{load_with_format, LoadError, LoadOptions, SourceFormat};
use super::model::Dataset;

/// Identity of a parsed upload: content digest plus the decoder used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub digest: [u8; 32],
    pub format: SourceFormat,
    pub options: LoadOptions,
}

impl CacheKey {
    pub fn new(bytes: &[u8], format: SourceFormat, options: &LoadOptions) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        CacheKey {
            digest,
            format,
            options: options.clone(),
        }
    }

    /// Short hex prefix of the digest, for log lines.
    pub fn short_hex(&self) -> String {
        self.digest[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Explicit memoization table of parsed datasets.
///
/// Entries live until [`DatasetCache::invalidate`] or [`DatasetCache::clear`].
/// Failed loads are never stored.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<CacheKey, Arc<Dataset>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset for these bytes, parsing them on a miss.
    pub fn get_or_load(
        &mut self,
        name: &str,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<(CacheKey, Arc<Dataset>), LoadError> {
        let format = SourceFormat::from_name(name)?;
        let key = CacheKey::new(bytes, format, options);

        if let Some(dataset) = self.entries.get(&key) {
            log::debug!("Cache hit for '{name}' ({})", key.short_hex());
            return Ok((key, Arc::clone(dataset)));
        }

        log::debug!("Cache miss for '{name}' ({})", key.short_hex());
        let dataset = Arc::new(load_with_format(format, bytes, options)?);
        self.entries.insert(key.clone(), Arc::clone(&dataset));
        Ok((key, dataset))
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Dataset>> {
        self.entries.get(key).cloned()
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

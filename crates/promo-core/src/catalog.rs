//! Promo-code catalog.
//!
//! Holds the resolved [`PromoCodeDefinition`]s keyed by lowercased name.
//! Replaced wholesale on configuration reload; individual codes are added
//! by admins or removed by the expired-code cleanup.
//!
//! ## Expiration anchoring
//!
//! A code configured only with `expiration_days` gets
//! `expires_at = first load + days`. Reloads keep that anchor as long as
//! the code and its `expiration_days` are unchanged, so reloading does not
//! silently extend a code's life. An explicit `expires_at` always wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use promo_types::{code_key, Clock, PromoCodeConfig, PromoCodeDefinition};

use crate::CatalogError;

/// Persists the catalog back to wherever it was loaded from.
pub trait DefinitionSink: Send + Sync {
    fn save(&self, codes: &[PromoCodeConfig]) -> Result<(), CatalogError>;
}

#[derive(Default)]
struct Catalog {
    codes: BTreeMap<String, PromoCodeDefinition>,
    /// Relative expirations already anchored: key -> (days, anchor).
    anchors: HashMap<String, (u32, DateTime<Utc>)>,
}

/// The in-memory definition store.
pub struct DefinitionStore {
    clock: Arc<dyn Clock>,
    inner: RwLock<Catalog>,
}

impl DefinitionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Catalog::default()),
        }
    }

    /// Build a store from configuration.
    pub fn from_configs(configs: &[PromoCodeConfig], clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(clock);
        store.load(configs);
        store
    }

    /// Replace the catalog with `configs`. Returns the number of codes.
    pub fn load(&self, configs: &[PromoCodeConfig]) -> usize {
        let now = self.clock.now();
        let mut catalog = self.write();
        let mut codes = BTreeMap::new();
        let mut anchors = HashMap::new();

        for config in configs {
            if config.name.is_empty() {
                warn!("skipping promo code with empty name");
                continue;
            }
            let key = code_key(&config.name);
            let definition = match config.expires_at {
                Some(_) => config.resolve(now),
                None => {
                    let anchor = match catalog.anchors.get(&key) {
                        Some(&(days, anchor)) if days == config.expiration_days => anchor,
                        _ => now,
                    };
                    anchors.insert(key.clone(), (config.expiration_days, anchor));
                    config.resolve(anchor)
                }
            };
            if codes.insert(key, definition).is_some() {
                warn!(code = %config.name, "duplicate promo code name, last definition wins");
            }
        }

        let count = codes.len();
        catalog.codes = codes;
        catalog.anchors = anchors;
        info!(codes = count, "promo code catalog loaded");
        count
    }

    /// Look up a code (case-insensitive).
    pub fn get(&self, name: &str) -> Option<PromoCodeDefinition> {
        self.read().codes.get(&code_key(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().codes.contains_key(&code_key(name))
    }

    /// All codes ordered by lowercased name.
    pub fn all(&self) -> Vec<PromoCodeDefinition> {
        self.read().codes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a new code.
    pub fn add(&self, config: &PromoCodeConfig) -> Result<PromoCodeDefinition, CatalogError> {
        if config.name.trim().is_empty() {
            return Err(CatalogError::InvalidName);
        }
        if config.is_temporary && config.temporary_hours == 0 {
            return Err(CatalogError::InvalidDuration(config.name.clone()));
        }
        let key = code_key(&config.name);
        let now = self.clock.now();
        let mut catalog = self.write();
        if catalog.codes.contains_key(&key) {
            return Err(CatalogError::Duplicate(config.name.clone()));
        }
        let definition = config.resolve(now);
        if config.expires_at.is_none() {
            catalog
                .anchors
                .insert(key.clone(), (config.expiration_days, now));
        }
        catalog.codes.insert(key, definition.clone());
        info!(code = %definition.name, expires_at = %definition.expires_at, "promo code added");
        Ok(definition)
    }

    /// Remove a code. Returns the removed definition.
    pub fn remove(&self, name: &str) -> Option<PromoCodeDefinition> {
        let key = code_key(name);
        let mut catalog = self.write();
        catalog.anchors.remove(&key);
        catalog.codes.remove(&key)
    }

    /// Codes whose expiration has passed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<PromoCodeDefinition> {
        self.read()
            .codes
            .values()
            .filter(|d| d.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Configuration form of the whole catalog with expirations pinned.
    pub fn to_configs(&self) -> Vec<PromoCodeConfig> {
        self.read()
            .codes
            .values()
            .map(PromoCodeDefinition::to_config)
            .collect()
    }

    /// Write the catalog through `sink`.
    pub fn save(&self, sink: &dyn DefinitionSink) -> Result<(), CatalogError> {
        sink.save(&self.to_configs())
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

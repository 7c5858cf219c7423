use crate::futures::FuturesAggregate;
use crate::options::LegMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Everything the next run needs as its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedState {
    pub ts: DateTime<FixedOffset>,
    pub expiry: String,
    pub spot: f64,
    #[serde(default)]
    pub legs: LegMap,
    #[serde(default)]
    pub futures: Option<FuturesAggregate>,
    #[serde(default)]
    pub premium: Option<f64>,
}

impl CachedState {
    /// Leg baseline for `expiry`. After a rollover the cached legs belong to
    /// other contracts and are not comparable.
    pub fn legs_for_expiry(&self, expiry: &str) -> Option<&LegMap> {
        (self.expiry == expiry).then_some(&self.legs)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Single JSON document holding the latest snapshot.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable cache means there is no previous data.
    pub async fn load(&self) -> Option<CachedState> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                debug!("No cache at {:?}: {e}", self.path);
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring unreadable cache {:?}: {e}", self.path);
                None
            }
        }
    }

    /// Writes a sibling temp file and renames it over the cache.
    pub async fn save(&self, state: &CachedState) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let data = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Saved cache to {:?}", self.path);

        Ok(())
    }
}

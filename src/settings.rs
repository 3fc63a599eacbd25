//! Symbolic duration tiers and the providers that turn them into minutes.
//!
//! Callers pick a tier (`CacheExpiration::Short`, `CacheSliding::Long`, ...)
//! instead of a raw duration. A [`SettingsProvider`] maps the tier to minutes,
//! either the intrinsic value ([`DefaultSettings`]) or an override from a
//! configuration table ([`ConfiguredSettings`]).
//!
//! Override tables name tiers as `"<Kind>.<Tier>"`:
//!
//! ```rust
//! use flight_cache::settings::{CacheExpiration, ConfiguredSettings, DurationTier, SettingsProvider};
//!
//! # fn main() -> flight_cache::Result<()> {
//! let settings = ConfiguredSettings::from_json(r#"{ "CacheExpiration.Short": 15 }"#)?;
//! assert_eq!(settings.resolve_minutes(CacheExpiration::Short.into()), 15);
//! assert_eq!(settings.resolve_minutes(CacheExpiration::Long.into()), 3600);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

macro_rules! duration_tiers {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            VeryShort,
            Short,
            Medium,
            Long,
            VeryLong,
        }

        impl $name {
            pub const ALL: [$name; 5] = [
                $name::VeryShort,
                $name::Short,
                $name::Medium,
                $name::Long,
                $name::VeryLong,
            ];

            /// Intrinsic length of the tier, in minutes.
            pub fn minutes(self) -> u32 {
                match self {
                    $name::VeryShort => 10,
                    $name::Short => 60,
                    $name::Medium => 300,
                    $name::Long => 3600,
                    $name::VeryLong => 86400,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $name::VeryShort => "VeryShort",
                    $name::Short => "Short",
                    $name::Medium => "Medium",
                    $name::Long => "Long",
                    $name::VeryLong => "VeryLong",
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                Self::ALL.into_iter().find(|tier| tier.name() == name)
            }
        }
    };
}

duration_tiers!(
    /// Tiers for absolute expiration.
    CacheExpiration
);

duration_tiers!(
    /// Tiers for sliding expiration.
    CacheSliding
);

/// A tier of either kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DurationTier {
    Expiration(CacheExpiration),
    Sliding(CacheSliding),
}

impl DurationTier {
    /// Every tier of both kinds.
    pub fn all() -> impl Iterator<Item = DurationTier> {
        CacheExpiration::ALL
            .into_iter()
            .map(DurationTier::Expiration)
            .chain(CacheSliding::ALL.into_iter().map(DurationTier::Sliding))
    }

    pub fn intrinsic_minutes(self) -> u32 {
        match self {
            DurationTier::Expiration(tier) => tier.minutes(),
            DurationTier::Sliding(tier) => tier.minutes(),
        }
    }

    /// Parse a qualified name such as `"CacheSliding.Medium"`.
    pub fn parse(qualified: &str) -> Option<DurationTier> {
        let (kind, tier) = qualified.split_once('.')?;
        match kind {
            "CacheExpiration" => CacheExpiration::from_name(tier).map(DurationTier::Expiration),
            "CacheSliding" => CacheSliding::from_name(tier).map(DurationTier::Sliding),
            _ => None,
        }
    }
}

impl fmt::Display for DurationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationTier::Expiration(tier) => write!(f, "CacheExpiration.{}", tier.name()),
            DurationTier::Sliding(tier) => write!(f, "CacheSliding.{}", tier.name()),
        }
    }
}

impl From<CacheExpiration> for DurationTier {
    fn from(tier: CacheExpiration) -> Self {
        DurationTier::Expiration(tier)
    }
}

impl From<CacheSliding> for DurationTier {
    fn from(tier: CacheSliding) -> Self {
        DurationTier::Sliding(tier)
    }
}

/// Maps duration tiers to concrete lengths.
pub trait SettingsProvider: Send + Sync {
    /// Number of minutes the tier stands for.
    fn resolve_minutes(&self, tier: DurationTier) -> u32;

    /// The tier as a [`Duration`].
    fn resolve(&self, tier: DurationTier) -> Duration {
        Duration::from_secs(u64::from(self.resolve_minutes(tier)) * 60)
    }
}

/// Provider that always answers with the intrinsic tier values.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSettings;

impl SettingsProvider for DefaultSettings {
    fn resolve_minutes(&self, tier: DurationTier) -> u32 {
        tier.intrinsic_minutes()
    }
}

/// Provider with per-tier overrides read from a configuration table.
///
/// The table is validated when the provider is built, so lookups never fail.
/// Tiers without an override fall back to their intrinsic value. Each tier is
/// resolved once and memoized.
#[derive(Debug, Default)]
pub struct ConfiguredSettings {
    overrides: HashMap<DurationTier, u32>,
    resolved: DashMap<DurationTier, u32>,
}

impl ConfiguredSettings {
    /// Build from `"<Kind>.<Tier>" -> minutes` pairs.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for an unknown tier name or a zero value.
    pub fn new<I, K>(table: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, u32)>,
        K: AsRef<str>,
    {
        let mut overrides = HashMap::new();
        for (name, minutes) in table {
            let name = name.as_ref();
            let tier = DurationTier::parse(name)
                .ok_or_else(|| Error::ConfigError(format!("Unknown duration tier: {}", name)))?;
            if minutes == 0 {
                return Err(Error::ConfigError(format!(
                    "Duration tier {} must be at least one minute",
                    name
                )));
            }
            overrides.insert(tier, minutes);
        }

        debug!("✓ Duration settings loaded ({} overrides)", overrides.len());
        Ok(ConfiguredSettings {
            overrides,
            resolved: DashMap::new(),
        })
    }

    /// Build from a JSON object such as `{"CacheSliding.Short": 20}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for malformed JSON or an invalid table.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: HashMap<String, u32> = serde_json::from_str(json)?;
        Self::new(table)
    }

    /// Override configured for `tier`, if any.
    pub fn override_for(&self, tier: DurationTier) -> Option<u32> {
        self.overrides.get(&tier).copied()
    }

    /// Number of tiers resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

impl SettingsProvider for ConfiguredSettings {
    fn resolve_minutes(&self, tier: DurationTier) -> u32 {
        *self.resolved.entry(tier).or_insert_with(|| {
            let minutes = self
                .override_for(tier)
                .unwrap_or_else(|| tier.intrinsic_minutes());
            trace!("Resolved {} -> {} minutes", tier, minutes);
            minutes
        })
    }
}

impl<S: SettingsProvider + ?Sized> SettingsProvider for std::sync::Arc<S> {
    fn resolve_minutes(&self, tier: DurationTier) -> u32 {
        (**self).resolve_minutes(tier)
    }
}

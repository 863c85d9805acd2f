//! Subscription tiers and their admission limits.
//!
//! Limits are static for the life of the process. Defaults match the published
//! pricing table; each value can be overridden with
//! `TIER_<NAME>_REQUESTS_PER_MINUTE` / `TIER_<NAME>_MAX_CONCURRENT`.

use serde::Serialize;

use crate::config::env_parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Plus,
    Enterprise,
}

impl Tier {
    pub const ALL: [Self; 4] = [Self::Free, Self::Pro, Self::Plus, Self::Enterprise];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Plus => "plus",
            Self::Enterprise => "enterprise",
        }
    }

    /// Strict parse. `business` is the billing-side name for `plus`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "plus" | "business" => Some(Self::Plus),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Lenient parse used on the admission path: unknown tiers get `free`
    /// limits. An unknown tier means the users table and the tier table have
    /// drifted apart, so it is logged.
    #[must_use]
    pub fn resolve(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!(tier = raw, "unrecognized subscription tier; applying free limits");
            Self::Free
        })
    }

    fn env_prefix(self) -> &'static str {
        match self {
            Self::Free => "TIER_FREE",
            Self::Pro => "TIER_PRO",
            Self::Plus => "TIER_PLUS",
            Self::Enterprise => "TIER_ENTERPRISE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Requests admitted per one-minute window.
    pub requests_per_window: i64,
    /// In-flight (pending or processing) requests allowed at once.
    pub max_concurrent: i64,
}

impl TierLimits {
    #[must_use]
    pub const fn new(requests_per_window: i64, max_concurrent: i64) -> Self {
        Self { requests_per_window, max_concurrent }
    }

    #[must_use]
    pub const fn default_for(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self::new(10, 2),
            Tier::Pro => Self::new(100, 10),
            Tier::Plus => Self::new(500, 25),
            Tier::Enterprise => Self::new(10_000, 50),
        }
    }
}

/// Immutable tier → limits mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimitTable {
    free: TierLimits,
    pro: TierLimits,
    plus: TierLimits,
    enterprise: TierLimits,
}

impl TierLimitTable {
    #[must_use]
    pub const fn defaults() -> Self {
        Self {
            free: TierLimits::default_for(Tier::Free),
            pro: TierLimits::default_for(Tier::Pro),
            plus: TierLimits::default_for(Tier::Plus),
            enterprise: TierLimits::default_for(Tier::Enterprise),
        }
    }

    /// Defaults with per-tier environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let load = |tier: Tier| {
            let base = TierLimits::default_for(tier);
            let prefix = tier.env_prefix();
            TierLimits::new(
                env_parse(&format!("{prefix}_REQUESTS_PER_MINUTE"), base.requests_per_window).max(0),
                env_parse(&format!("{prefix}_MAX_CONCURRENT"), base.max_concurrent).max(0),
            )
        };
        Self {
            free: load(Tier::Free),
            pro: load(Tier::Pro),
            plus: load(Tier::Plus),
            enterprise: load(Tier::Enterprise),
        }
    }

    #[must_use]
    pub fn limits(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Plus => self.plus,
            Tier::Enterprise => self.enterprise,
        }
    }

    /// Replace one tier's limits. Used at start-up and in tests.
    #[must_use]
    pub fn with(mut self, tier: Tier, limits: TierLimits) -> Self {
        match tier {
            Tier::Free => self.free = limits,
            Tier::Pro => self.pro = limits,
            Tier::Plus => self.plus = limits,
            Tier::Enterprise => self.enterprise = limits,
        }
        self
    }
}

impl Default for TierLimitTable {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
#[path = "tier_test.rs"]
mod tests;

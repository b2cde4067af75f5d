//! Founder / treasury reward schedules (Equihash family).
//!
//! Every schedule variant is a fixed, ordered list of [`RewardTrack`]s. A
//! track pays one recipient from its list while the block height lies inside
//! its activation window, rotating through the list every `interval` blocks:
//!
//! ```text
//! index = ((height - start_height) / interval) mod recipients.len()
//! ```
//!
//! The rotation must match the daemon's own schedule exactly, otherwise the
//! daemon rejects the block.

use bitcoin::ScriptBuf;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::PoolError;

/// The closed set of schedule layouts a coin can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardScheduleVariant {
    /// Treasury, secure-node and super-node tracks.
    TreasuryAndNodes,
    /// A single treasury track.
    Treasury,
    /// A single founders track.
    Founders,
}

impl RewardScheduleVariant {
    /// Parse a configured variant name.
    pub fn from_name(name: &str) -> Result<Self, PoolError> {
        match name {
            "equihash-rewards1" => Ok(Self::TreasuryAndNodes),
            "equihash-rewards2" => Ok(Self::Treasury),
            "equihash-rewards3" => Ok(Self::Founders),
            other => Err(PoolError::Config(format!(
                "unknown reward schedule variant {}",
                other
            ))),
        }
    }

    /// Track names in output order.
    pub fn track_names(&self) -> &'static [&'static str] {
        match self {
            Self::TreasuryAndNodes => &["treasury", "secure_nodes", "super_nodes"],
            Self::Treasury => &["treasury"],
            Self::Founders => &["founders"],
        }
    }
}

/// One height-windowed, rotating side payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTrack {
    name: &'static str,
    recipients: Vec<ScriptBuf>,
    fraction: Decimal,
    start_height: u64,
    end_height: u64,
    interval: u64,
}

impl RewardTrack {
    /// Create a track, validating its window and recipient list.
    pub fn new(
        name: &'static str,
        recipients: Vec<ScriptBuf>,
        fraction: Decimal,
        start_height: u64,
        end_height: u64,
        interval: u64,
    ) -> Result<Self, PoolError> {
        if recipients.is_empty() {
            return Err(PoolError::Config(format!("reward track {} has no recipients", name)));
        }
        if interval == 0 {
            return Err(PoolError::Config(format!("reward track {} has a zero interval", name)));
        }
        if start_height > end_height {
            return Err(PoolError::Config(format!(
                "reward track {} starts after it ends",
                name
            )));
        }
        Ok(Self {
            name,
            recipients,
            fraction,
            start_height,
            end_height,
            interval,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fraction(&self) -> Decimal {
        self.fraction
    }

    /// Whether `start_height <= height <= end_height`.
    pub fn is_active(&self, height: u64) -> bool {
        (self.start_height..=self.end_height).contains(&height)
    }

    /// Index of the recipient paid at `height`, or `None` outside the window.
    pub fn recipient_index(&self, height: u64) -> Option<usize> {
        if !self.is_active(height) {
            return None;
        }
        let period = (height - self.start_height) / self.interval;
        Some((period % self.recipients.len() as u64) as usize)
    }

    /// Script of the recipient paid at `height`.
    pub fn recipient_at(&self, height: u64) -> Option<&ScriptBuf> {
        self.recipient_index(height).map(|i| &self.recipients[i])
    }

    /// `floor(reward * fraction)`.
    pub fn amount(&self, reward: u64) -> Result<u64, PoolError> {
        fraction_of(reward, self.fraction)
    }
}

/// A payout produced by a track for a specific height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPayout {
    pub track: &'static str,
    pub script: ScriptBuf,
    pub amount: u64,
}

/// An ordered set of reward tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSchedule {
    variant: RewardScheduleVariant,
    tracks: Vec<RewardTrack>,
}

impl RewardSchedule {
    pub fn new(variant: RewardScheduleVariant, tracks: Vec<RewardTrack>) -> Self {
        Self { variant, tracks }
    }

    pub fn variant(&self) -> RewardScheduleVariant {
        self.variant
    }

    pub fn tracks(&self) -> &[RewardTrack] {
        &self.tracks
    }

    /// Sum of all track fractions, active or not.
    pub fn total_fraction(&self) -> Decimal {
        self.tracks.iter().map(|t| t.fraction).sum()
    }

    /// Payouts due at `height`, in track order. Inactive tracks are skipped.
    pub fn payouts(&self, height: u64, reward: u64) -> Result<Vec<TrackPayout>, PoolError> {
        self.tracks
            .iter()
            .filter_map(|track| track.recipient_at(height).map(|script| (track, script)))
            .map(|(track, script)| {
                Ok(TrackPayout {
                    track: track.name,
                    script: script.clone(),
                    amount: track.amount(reward)?,
                })
            })
            .collect()
    }
}

/// `floor(amount * fraction)` with exact decimal arithmetic.
pub fn fraction_of(amount: u64, fraction: Decimal) -> Result<u64, PoolError> {
    if fraction.is_sign_negative() {
        return Err(PoolError::RewardAccounting(format!(
            "negative fraction {}",
            fraction
        )));
    }
    Decimal::from(amount)
        .checked_mul(fraction)
        .and_then(|v| v.floor().to_u64())
        .ok_or_else(|| {
            PoolError::RewardAccounting(format!("{} x {} is out of range", amount, fraction))
        })
}

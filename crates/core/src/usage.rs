//! Token and cost metering across provider calls.
//!
//! Costs are kept as integer nano-dollars so that accumulating usage over
//! many calls is exact and order-independent.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// A monetary amount in billionths of a US dollar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NanoUsd(pub u64);

impl NanoUsd {
    pub const ZERO: NanoUsd = NanoUsd(0);

    /// Convert a fractional dollar amount, rounding to the nearest nano-dollar.
    pub fn from_usd(usd: f64) -> Self {
        if !usd.is_finite() || usd <= 0.0 {
            return Self::ZERO;
        }
        NanoUsd((usd * 1e9).round() as u64)
    }

    pub fn as_usd(self) -> f64 {
        self.0 as f64 / 1e9
    }
}

impl Add for NanoUsd {
    type Output = NanoUsd;

    fn add(self, rhs: NanoUsd) -> NanoUsd {
        NanoUsd(self.0.saturating_add(rhs.0))
    }
}

impl std::fmt::Display for NanoUsd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.6}", self.as_usd())
    }
}

/// Running totals of tokens and cost for one or more provider calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAccount {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: NanoUsd,
}

impl UsageAccount {
    /// The identity element for [`UsageAccount::combine`].
    pub const fn zero() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cost: NanoUsd::ZERO,
        }
    }

    /// Build an account for a single call.
    pub fn new(input_tokens: u64, output_tokens: u64, cost: NanoUsd) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost,
        }
    }

    /// Field-wise sum of two accounts.
    pub fn combine(self, other: UsageAccount) -> UsageAccount {
        UsageAccount {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
            cost: self.cost + other.cost,
        }
    }

    /// Combine with an account that may be missing; a missing account counts as zero.
    pub fn combine_opt(self, other: Option<UsageAccount>) -> UsageAccount {
        self.combine(other.unwrap_or_default())
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

impl Add for UsageAccount {
    type Output = UsageAccount;

    fn add(self, rhs: UsageAccount) -> UsageAccount {
        self.combine(rhs)
    }
}

impl AddAssign for UsageAccount {
    fn add_assign(&mut self, rhs: UsageAccount) {
        *self = self.combine(rhs);
    }
}

impl Sum for UsageAccount {
    fn sum<I: Iterator<Item = UsageAccount>>(iter: I) -> Self {
        iter.fold(UsageAccount::zero(), UsageAccount::combine)
    }
}

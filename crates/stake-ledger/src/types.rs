//! Shared primitive types: addresses, amounts and fixed-point rates.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use primitive_types::{U256, U512};

/// Block time in seconds
pub type Timestamp = u64;

/// Block height
pub type BlockNumber = u64;

/// Rates are basis points: 10_000 = 1.0
pub type RateBps = u64;

/// Denominator for every [`RateBps`]
pub const BPS_DENOMINATOR: RateBps = 10_000;

pub const DAY_SECS: Timestamp = 86_400;

/// Fixed-term months are 30 days
pub const MONTH_SECS: Timestamp = 30 * DAY_SECS;

/// 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    /// Address whose trailing bytes hold `v` (big-endian)
    pub fn from_low_u64(v: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&v.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Parse `0x`-prefixed or bare hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| LedgerError::InvalidArguments("address hex"))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidArguments("address length"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Checked `a + b`
pub fn add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

/// Checked `a - b`
pub fn sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or(LedgerError::Overflow)
}

/// Checked `a * b`
pub fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(LedgerError::Overflow)
}

/// `floor(a * b / denom)` computed in 512 bits
pub fn mul_div(a: U256, b: U256, denom: U256) -> Result<U256> {
    if denom.is_zero() {
        return Err(LedgerError::Invariant("division by zero weight".into()));
    }
    let wide = a.full_mul(b) / U512::from(denom);
    U256::try_from(wide).map_err(|_| LedgerError::Overflow)
}

/// Checked sum of an iterator of amounts
pub fn sum<I: IntoIterator<Item = U256>>(items: I) -> Result<U256> {
    items.into_iter().try_fold(U256::zero(), add)
}

/// `amount * rate / 10_000`, floored
pub fn apply_bps(amount: U256, rate: RateBps) -> Result<U256> {
    mul_div(amount, U256::from(rate), U256::from(BPS_DENOMINATOR))
}

//! Fee market snapshot and speed tiers.

use serde::Serialize;

use crate::blockchain::pool::ClientPool;
use crate::blockchain::types::BlockchainResult;

/// Confirmation speed a caller is willing to pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GasSpeed {
    Fastest,
    Fast,
    Standard,
    Slow,
}

impl GasSpeed {
    pub const ALL: [GasSpeed; 4] = [
        GasSpeed::Fastest,
        GasSpeed::Fast,
        GasSpeed::Standard,
        GasSpeed::Slow,
    ];

    /// Base fee multiplier in tenths.
    fn base_tenths(self) -> u128 {
        match self {
            GasSpeed::Fastest => 12,
            GasSpeed::Fast => 11,
            GasSpeed::Standard => 10,
            GasSpeed::Slow => 9,
        }
    }

    /// Priority fee multiplier in tenths.
    fn priority_tenths(self) -> u128 {
        match self {
            GasSpeed::Fastest => 20,
            GasSpeed::Fast => 15,
            GasSpeed::Standard => 10,
            GasSpeed::Slow => 5,
        }
    }

    /// Rough time to inclusion in seconds.
    pub fn estimated_wait_secs(self) -> u64 {
        match self {
            GasSpeed::Fastest => 15,
            GasSpeed::Fast => 30,
            GasSpeed::Standard => 60,
            GasSpeed::Slow => 180,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GasSpeed::Fastest => "FASTEST",
            GasSpeed::Fast => "FAST",
            GasSpeed::Standard => "STANDARD",
            GasSpeed::Slow => "SLOW",
        }
    }
}

impl std::str::FromStr for GasSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FASTEST" => Ok(GasSpeed::Fastest),
            "FAST" => Ok(GasSpeed::Fast),
            "STANDARD" => Ok(GasSpeed::Standard),
            "SLOW" => Ok(GasSpeed::Slow),
            other => Err(format!("unknown gas speed '{}'", other)),
        }
    }
}

/// Fee market at the latest block. Recomputed on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GasQuote {
    pub chain_id: u64,
    pub block_number: u64,
    /// Wei. Falls back to the legacy gas price on chains without a base fee.
    pub base_fee: u128,
    pub priority_fee: u128,
}

/// EIP-1559 fee pair for one speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierFees {
    pub speed: GasSpeed,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub estimated_wait_secs: u64,
}

impl GasQuote {
    pub fn tier(&self, speed: GasSpeed) -> TierFees {
        let base = self.base_fee.saturating_mul(speed.base_tenths()) / 10;
        let priority = self.priority_fee.saturating_mul(speed.priority_tenths()) / 10;
        TierFees {
            speed,
            max_fee_per_gas: base.saturating_add(priority),
            max_priority_fee_per_gas: priority,
            estimated_wait_secs: speed.estimated_wait_secs(),
        }
    }

    pub fn tiers(&self) -> Vec<TierFees> {
        GasSpeed::ALL.iter().map(|speed| self.tier(*speed)).collect()
    }
}

/// Snapshot the fee market of `chain_id`.
pub async fn quote(pool: &ClientPool, chain_id: u64) -> BlockchainResult<GasQuote> {
    let client = pool.get_client(chain_id).await?;
    let block_number = client.block_number().await?;
    let base_fee = match client.latest_base_fee().await? {
        Some(base_fee) => base_fee,
        None => client.gas_price().await?,
    };
    let priority_fee = client.max_priority_fee().await?;

    Ok(GasQuote {
        chain_id,
        block_number,
        base_fee,
        priority_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GasQuote {
        GasQuote {
            chain_id: 1,
            block_number: 19_000_000,
            base_fee: 30_000_000_000,
            priority_fee: 2_000_000_000,
        }
    }

    #[test]
    fn test_standard_tier_is_market() {
        let fees = sample().tier(GasSpeed::Standard);
        assert_eq!(fees.max_priority_fee_per_gas, 2_000_000_000);
        assert_eq!(fees.max_fee_per_gas, 32_000_000_000);
        assert_eq!(fees.estimated_wait_secs, 60);
    }

    #[test]
    fn test_tier_multipliers() {
        let quote = sample();
        let fastest = quote.tier(GasSpeed::Fastest);
        assert_eq!(fastest.max_priority_fee_per_gas, 4_000_000_000);
        assert_eq!(fastest.max_fee_per_gas, 36_000_000_000 + 4_000_000_000);

        let slow = quote.tier(GasSpeed::Slow);
        assert_eq!(slow.max_priority_fee_per_gas, 1_000_000_000);
        assert_eq!(slow.max_fee_per_gas, 27_000_000_000 + 1_000_000_000);
    }

    #[test]
    fn test_tiers_ordered_by_price() {
        let tiers = sample().tiers();
        assert_eq!(tiers.len(), 4);
        assert!(tiers
            .windows(2)
            .all(|w| w[0].max_fee_per_gas > w[1].max_fee_per_gas));
    }

    #[test]
    fn test_speed_parse() {
        assert_eq!("fast".parse::<GasSpeed>().unwrap(), GasSpeed::Fast);
        assert_eq!("SLOW".parse::<GasSpeed>().unwrap(), GasSpeed::Slow);
        assert!("warp".parse::<GasSpeed>().is_err());
    }
}

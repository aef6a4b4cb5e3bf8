//! Consensus parameters and monetary policy.
//!
//! The core holds no process-wide state: every component takes a
//! [`Params`] reference describing the network it validates for. Three
//! presets exist (mainnet, testnet, regtest); embedders may construct
//! their own for private networks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{COIN, DUST_FLOOR};
use crate::types::{AssetId, Hash256};

/// A BIP9-style deployment signalled through header version bits.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deployment {
    /// Bit position in the block version field (0–28).
    pub bit: u8,
    /// Unix time at which signalling may begin. `-1` disables the
    /// deployment.
    pub start_time: i64,
    /// Unix time after which the deployment fails. `-1` means no timeout.
    pub timeout: i64,
}

/// Per-asset consensus policy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetPolicy {
    /// Upper bound on any single amount and on running sums.
    pub max_money: u64,
    /// Outputs below this are rejected as dust.
    pub dust_floor: u64,
    /// Whether the asset may be minted through the coinbase.
    pub pow_allowed: bool,
}

/// Consensus parameters consumed by the core.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Params {
    pub subsidy_halving_interval: u32,
    /// Intended seconds between blocks.
    pub pow_target_spacing: u32,
    /// Seconds per retarget window.
    pub pow_target_timespan: u32,
    /// Blocks per retarget window.
    pub difficulty_adjustment_interval: u32,
    /// Default money cap for assets without an explicit policy.
    pub max_money_out: u64,
    /// Test networks may recover to minimum difficulty after a stall.
    pub allow_min_difficulty_blocks: bool,
    pub genesis_time: u32,
    /// Compact encoding of the proof-of-work limit; also the genesis
    /// target.
    pub genesis_bits: u32,
    /// Zero means "mine the genesis nonce at first use".
    pub genesis_nonce: u32,
    pub genesis_message: String,
    /// Hardened checkpoints: headers at these heights must match exactly.
    pub checkpoints: BTreeMap<u32, Hash256>,
    /// Signalling blocks required within one window to lock a deployment
    /// in.
    pub rule_change_activation_threshold: u32,
    /// Length of a version-bits signalling window in blocks.
    pub miner_confirmation_window: u32,
    pub deployments: Vec<Deployment>,
    /// Height at which the coinbase becomes restricted to the
    /// proof-of-work asset. `u32::MAX` leaves the rule inactive.
    pub asset_rule_height: u32,
    /// Registered assets and their policies.
    pub assets: BTreeMap<AssetId, AssetPolicy>,
}

impl Params {
    /// Main network parameters.
    pub fn mainnet() -> Self {
        Self {
            subsidy_halving_interval: 210_000,
            pow_target_spacing: 60,
            pow_target_timespan: 3_600,
            difficulty_adjustment_interval: 60,
            max_money_out: 42_000_000 * COIN,
            allow_min_difficulty_blocks: false,
            genesis_time: 1_735_689_600,
            genesis_bits: 0x1e0f_ffff,
            genesis_nonce: 0,
            genesis_message: "STATER: proof before trust".to_string(),
            checkpoints: BTreeMap::new(),
            rule_change_activation_threshold: default_threshold(),
            miner_confirmation_window: DEFAULT_WINDOW,
            deployments: vec![Deployment { bit: 28, start_time: -1, timeout: -1 }],
            asset_rule_height: 0,
            assets: default_assets(42_000_000 * COIN),
        }
    }

    /// Test network parameters: easier limit, min-difficulty recovery.
    pub fn testnet() -> Self {
        Self {
            allow_min_difficulty_blocks: true,
            genesis_bits: 0x1f00_ffff,
            genesis_message: "STATER TESTNET".to_string(),
            asset_rule_height: u32::MAX,
            ..Self::mainnet()
        }
    }

    /// Local regression-test parameters: trivial proof of work.
    pub fn regtest() -> Self {
        Self {
            allow_min_difficulty_blocks: true,
            genesis_bits: 0x207f_ffff,
            genesis_message: "STATER REGTEST".to_string(),
            asset_rule_height: u32::MAX,
            checkpoints: BTreeMap::new(),
            ..Self::mainnet()
        }
    }

    /// Policy for a registered asset.
    pub fn asset_policy(&self, asset: AssetId) -> Option<&AssetPolicy> {
        self.assets.get(&asset)
    }

    /// Whether the asset id is registered on this network.
    pub fn is_asset_registered(&self, asset: AssetId) -> bool {
        self.assets.contains_key(&asset)
    }

    /// Whether the coinbase asset restriction is active at `height`.
    pub fn multi_asset_active(&self, height: u32) -> bool {
        height >= self.asset_rule_height
    }

    /// Check an amount against the asset's money cap.
    pub fn money_range(&self, amount: u64, asset: AssetId) -> bool {
        let cap = self
            .asset_policy(asset)
            .map(|p| p.max_money)
            .unwrap_or(self.max_money_out);
        amount <= cap
    }

    /// Dust floor for an asset.
    pub fn dust_floor(&self, asset: AssetId) -> u64 {
        self.asset_policy(asset)
            .map(|p| p.dust_floor)
            .unwrap_or(DUST_FLOOR)
    }

    /// Block subsidy at `height` for `asset`.
    ///
    /// Only proof-of-work assets are minted; the base subsidy of 50 STR
    /// halves every [`subsidy_halving_interval`](Self::subsidy_halving_interval)
    /// blocks.
    pub fn subsidy(&self, height: u32, asset: AssetId) -> u64 {
        let mineable = self
            .asset_policy(asset)
            .map(|p| p.pow_allowed)
            .unwrap_or(false);
        if !mineable {
            return 0;
        }

        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 64 {
            return 0;
        }
        (50 * COIN) >> halvings
    }
}

const DEFAULT_WINDOW: u32 = 2_016;

const fn default_threshold() -> u32 {
    DEFAULT_WINDOW * 95 / 100
}

fn default_assets(max_money: u64) -> BTreeMap<AssetId, AssetPolicy> {
    let mut assets = BTreeMap::new();
    assets.insert(
        AssetId::STR,
        AssetPolicy {
            max_money,
            dust_floor: DUST_FLOOR,
            pow_allowed: true,
        },
    );
    assets.insert(
        AssetId::DRM,
        AssetPolicy {
            max_money,
            dust_floor: DUST_FLOOR,
            pow_allowed: false,
        },
    );
    assets
}

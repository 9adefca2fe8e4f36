//! Parameter overrides for deterministic test fixtures
//!
//! Only compiled for this crate's tests or with the `test-params` feature.
//! Each operation changes exactly one named rule and is idempotent.

use blast_core::Network;

use crate::arith::U256;
use crate::params::{ChainParams, DeploymentPos};

/// Builds a modified copy of a network's parameters
#[derive(Debug, Clone)]
pub struct ChainParamsBuilder {
    params: ChainParams,
}

impl ChainParamsBuilder {
    /// Start from the standard parameters of `network`
    pub fn new(network: Network) -> Self {
        ChainParamsBuilder {
            params: ChainParams::for_network(network),
        }
    }

    pub fn turn_off_segwit(mut self) -> Self {
        self.params.segwit_enabled = false;
        self
    }

    pub fn turn_off_csv(mut self) -> Self {
        self.params.csv_enabled = false;
        self
    }

    pub fn turn_off_bip34(mut self) -> Self {
        self.params.bip34_enabled = false;
        self
    }

    pub fn turn_off_bip65(mut self) -> Self {
        self.params.bip65_enabled = false;
        self
    }

    pub fn turn_off_bip66(mut self) -> Self {
        self.params.bip66_enabled = false;
        self
    }

    /// Rewrite the signaling window of one deployment
    pub fn update_version_bits_parameters(mut self, pos: DeploymentPos, start_time: i64, timeout: i64) -> Self {
        let deployment = &mut self.params.deployments[pos.index()];
        deployment.start_time = start_time;
        deployment.timeout = timeout;
        self
    }

    /// Require headers to carry one of the network's own chain IDs
    pub fn enforce_strict_chain_id(mut self) -> Self {
        self.params.strict_chain_id = true;
        self
    }

    /// Move the height from which merge-mined headers are accepted
    pub fn auxpow_start_height(mut self, height: u32) -> Self {
        self.params.auxpow_start_height = height;
        self
    }

    /// Replace the easiest allowed target
    pub fn pow_limit(mut self, limit: U256) -> Self {
        self.params.pow_limit = limit;
        self
    }

    /// Re-enable difficulty retargeting on networks that disable it
    pub fn enable_retargeting(mut self) -> Self {
        self.params.no_retargeting = false;
        self
    }

    pub fn build(self) -> ChainParams {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_touch_one_flag() {
        let params = ChainParamsBuilder::new(Network::Mainnet).turn_off_bip34().build();
        assert!(!params.bip34_enabled());
        assert!(params.bip66_enabled());
        assert!(params.csv_enabled());

        let params = ChainParamsBuilder::new(Network::Regtest)
            .turn_off_bip65()
            .turn_off_bip66()
            .turn_off_csv()
            .turn_off_segwit()
            .build();
        assert!(params.bip34_enabled());
        assert!(!params.bip65_enabled());
        assert!(!params.bip66_enabled());
        assert!(!params.csv_enabled());
        assert!(!params.segwit_enabled());
    }

    #[test]
    fn test_overrides_are_idempotent() {
        let once = ChainParamsBuilder::new(Network::Testnet)
            .update_version_bits_parameters(DeploymentPos::Csv, 100, 200)
            .build();
        let twice = ChainParamsBuilder::new(Network::Testnet)
            .update_version_bits_parameters(DeploymentPos::Csv, 100, 200)
            .update_version_bits_parameters(DeploymentPos::Csv, 100, 200)
            .build();

        assert_eq!(once.deployment(DeploymentPos::Csv), twice.deployment(DeploymentPos::Csv));
        assert_eq!(once.deployment(DeploymentPos::Csv).start_time, 100);
        assert_eq!(once.deployment(DeploymentPos::Csv).timeout, 200);
        assert_eq!(once.deployment(DeploymentPos::Csv).bit, 0);
    }

    #[test]
    fn test_shared_params_untouched() {
        let _ = ChainParamsBuilder::new(Network::Mainnet).enforce_strict_chain_id().build();
        assert!(!ChainParams::get(Network::Mainnet).strict_chain_id());
    }
}

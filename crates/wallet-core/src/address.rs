use crate::error::WalletError;
use crate::types::{Chain, ChainKind, CurveType};

/// Address encoding and validation for one chain.
///
/// Construction fails for a curve the chain does not sign with, so later
/// calls only deal with malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressService {
    chain: Chain,
    curve: CurveType,
}

impl AddressService {
    pub fn new(chain: Chain, curve: CurveType) -> Result<Self, WalletError> {
        if chain.curve() != curve {
            return Err(WalletError::UnsupportedCurve {
                chain: chain.to_string(),
                curve: curve.to_string(),
            });
        }
        Ok(Self { chain, curve })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn curve(&self) -> CurveType {
        self.curve
    }

    /// Default address for `public_key`: P2WPKH on UTXO chains, EIP-55 on
    /// EVM chains, Base58 on Solana.
    pub fn make_address(&self, public_key: &[u8]) -> Result<String, WalletError> {
        match self.chain.kind() {
            ChainKind::Utxo => {
                let network = self.btc_network()?;
                Ok(chain_btc::address::pubkey_to_p2wpkh_address(public_key, network)?)
            }
            ChainKind::Account => Ok(chain_eth::address::public_key_to_address(public_key)?),
            ChainKind::Message => Ok(chain_sol::address::public_key_to_address(public_key)?),
        }
    }

    pub fn validate(&self, address: &str) -> bool {
        match self.chain.kind() {
            ChainKind::Utxo => self
                .btc_network()
                .ok()
                .and_then(|network| chain_btc::address::validate_address(address, network).ok())
                .unwrap_or(false),
            ChainKind::Account => chain_eth::address::validate_address(address).unwrap_or(false),
            ChainKind::Message => chain_sol::address::validate_address(address).unwrap_or(false),
        }
    }

    fn btc_network(&self) -> Result<chain_btc::network::BtcNetwork, WalletError> {
        self.chain
            .btc_network()
            .ok_or_else(|| WalletError::Config(format!("{} has no bitcoin network", self.chain)))
    }
}

use serde::Serialize;

/// Definition of an EVM-compatible network.
#[derive(Debug, Clone, Serialize)]
pub struct EvmChain {
    pub chain_id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    /// Gas limit for a plain value transfer.
    pub transfer_gas_limit: u64,
    /// Gas limit used for ERC-20 `transfer` calls when the node gives none.
    pub token_transfer_gas_limit: u64,
    pub is_testnet: bool,
}

/// Ethereum Mainnet (chain ID 1).
pub const ETHEREUM: EvmChain = EvmChain {
    chain_id: 1,
    name: "Ethereum",
    symbol: "ETH",
    decimals: 18,
    transfer_gas_limit: 21_000,
    token_transfer_gas_limit: 65_000,
    is_testnet: false,
};

/// Polygon PoS (chain ID 137).
pub const POLYGON: EvmChain = EvmChain {
    chain_id: 137,
    name: "Polygon",
    symbol: "POL",
    decimals: 18,
    transfer_gas_limit: 21_000,
    token_transfer_gas_limit: 65_000,
    is_testnet: false,
};

/// Arbitrum One (chain ID 42161). L2 gas accounting needs more headroom.
pub const ARBITRUM: EvmChain = EvmChain {
    chain_id: 42161,
    name: "Arbitrum One",
    symbol: "ETH",
    decimals: 18,
    transfer_gas_limit: 600_000,
    token_transfer_gas_limit: 1_000_000,
    is_testnet: false,
};

/// Sepolia testnet (chain ID 11155111).
pub const SEPOLIA: EvmChain = EvmChain {
    chain_id: 11_155_111,
    name: "Sepolia",
    symbol: "ETH",
    decimals: 18,
    transfer_gas_limit: 21_000,
    token_transfer_gas_limit: 65_000,
    is_testnet: true,
};

const ALL_CHAINS: &[&EvmChain] = &[&ETHEREUM, &POLYGON, &ARBITRUM, &SEPOLIA];

/// Returns the chain definition for a given chain ID, or `None` if unsupported.
pub fn get_chain(chain_id: u64) -> Option<&'static EvmChain> {
    ALL_CHAINS.iter().find(|c| c.chain_id == chain_id).copied()
}

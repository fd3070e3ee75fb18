use serde::{Deserialize, Serialize};

use chain_btc::network::BtcNetwork;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    Ethereum,
    Polygon,
    Arbitrum,
    Solana,
    SolanaDevnet,
    // Testnets
    Sepolia,
}

/// How a chain models spendable state, which decides the builder variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    /// Discrete unspent outputs.
    Utxo,
    /// A balance plus a per-account sequence number.
    Account,
    /// A compiled message bound to a recent blockhash.
    Message,
}

impl Chain {
    pub fn kind(&self) -> ChainKind {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet => ChainKind::Utxo,
            Chain::Ethereum | Chain::Polygon | Chain::Arbitrum | Chain::Sepolia => {
                ChainKind::Account
            }
            Chain::Solana | Chain::SolanaDevnet => ChainKind::Message,
        }
    }

    /// Whether this chain uses secp256k1 (BTC/ETH) or Ed25519 (SOL)
    pub fn curve(&self) -> CurveType {
        match self {
            Chain::Solana | Chain::SolanaDevnet => CurveType::Ed25519,
            _ => CurveType::Secp256k1,
        }
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::BitcoinTestnet => "Bitcoin Testnet",
            Chain::Ethereum => "Ethereum",
            Chain::Polygon => "Polygon",
            Chain::Arbitrum => "Arbitrum One",
            Chain::Solana => "Solana",
            Chain::SolanaDevnet => "Solana Devnet",
            Chain::Sepolia => "Sepolia Testnet",
        }
    }

    /// Native token symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet => "BTC",
            Chain::Ethereum | Chain::Sepolia | Chain::Arbitrum => "ETH",
            Chain::Polygon => "POL",
            Chain::Solana | Chain::SolanaDevnet => "SOL",
        }
    }

    /// Decimal places of the native coin's smallest unit.
    pub fn decimals(&self) -> u32 {
        match self.kind() {
            ChainKind::Utxo => 8,
            ChainKind::Account => 18,
            ChainKind::Message => 9,
        }
    }

    /// Whether this is a testnet
    pub fn is_testnet(&self) -> bool {
        matches!(
            self,
            Chain::BitcoinTestnet | Chain::Sepolia | Chain::SolanaDevnet
        )
    }

    pub fn btc_network(&self) -> Option<BtcNetwork> {
        match self {
            Chain::Bitcoin => Some(BtcNetwork::Mainnet),
            Chain::BitcoinTestnet => Some(BtcNetwork::Testnet),
            _ => None,
        }
    }

    /// The EVM network definition for account chains.
    pub fn evm_chain(&self) -> Option<&'static chain_eth::chains::EvmChain> {
        let chain_id = match self {
            Chain::Ethereum => chain_eth::chains::ETHEREUM.chain_id,
            Chain::Polygon => chain_eth::chains::POLYGON.chain_id,
            Chain::Arbitrum => chain_eth::chains::ARBITRUM.chain_id,
            Chain::Sepolia => chain_eth::chains::SEPOLIA.chain_id,
            _ => return None,
        };
        chain_eth::chains::get_chain(chain_id)
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveType {
    Secp256k1,
    Ed25519,
}

impl std::fmt::Display for CurveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveType::Secp256k1 => write!(f, "secp256k1"),
            CurveType::Ed25519 => write!(f, "ed25519"),
        }
    }
}

//! Solana chain support for the wallet core.
//!
//! Address handling plus a hand-written implementation of Solana's compact
//! transaction wire format, without pulling in `solana-sdk`. Messages are
//! built unsigned, handed out as the signable payload, and assembled with
//! externally produced Ed25519 signatures.

pub mod address;
pub mod error;
pub mod transaction;

pub use address::{address_to_bytes, bytes_to_address, public_key_to_address, validate_address};
pub use error::SolError;
pub use transaction::{
    assemble_signed_transaction, build_sol_transfer, build_sol_transfer_with_memo,
    compile_transaction, decode_compact_u16,
    decode_transaction, encode_compact_u16, serialize_message, CompiledInstruction,
    DecodedSolTransaction, SignedSolTransaction, SolAccountMeta, SolInstruction, SolTransaction,
    MEMO_PROGRAM_ID, SYSTEM_PROGRAM_ID,
};

//! Manual Solana transaction wire format.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::address::{address_to_bytes, bytes_to_address};
use crate::error::SolError;

/// The System Program public key: 32 zero bytes.
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System Program `Transfer` instruction index (little-endian u32).
const SYSTEM_TRANSFER_IX_INDEX: u32 = 2;

const SIGNATURE_LEN: usize = 64;

/// SPL Memo program (v2).
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// Upper bound keeping a memo inside a single legacy packet.
const MAX_MEMO_LEN: usize = 566;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format (1 to 3 bytes).
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);
    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }
    out
}

/// Decode a compact-u16 from the front of `data`, returning the value and
/// the number of bytes consumed.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    for (index, byte) in data.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * index);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, index + 1))
                .map_err(|_| SolError::SerializationError("compact-u16 value overflow".into()));
        }
    }
    Err(SolError::SerializationError(
        "unexpected end of data while decoding compact-u16".into(),
    ))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

/// A Solana instruction before it is compiled into a message.
#[derive(Debug, Clone)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// An unsigned legacy Solana message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolTransaction {
    /// Account keys in canonical order: writable signers, read-only
    /// signers, writable non-signers, read-only non-signers.
    pub account_keys: Vec<[u8; 32]>,
    /// The first N accounts are signers.
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub recent_blockhash: [u8; 32],
    pub compiled_instructions: Vec<CompiledInstruction>,
}

/// An instruction whose account references are indices into `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// A message together with one signature per required signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSolTransaction {
    pub raw: Vec<u8>,
    /// Base58 of the fee payer's signature, which is the transaction id.
    pub signature: String,
}

/// Decoded wire transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSolTransaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: SolTransaction,
}

impl SolTransaction {
    /// `(from, to, lamports)` of the first System Program transfer, if any.
    pub fn system_transfer(&self) -> Option<([u8; 32], [u8; 32], u64)> {
        self.compiled_instructions.iter().find_map(|ix| {
            let program = self.account_keys.get(ix.program_id_index as usize)?;
            if *program != SYSTEM_PROGRAM_ID || ix.data.len() != 12 || ix.account_indices.len() != 2 {
                return None;
            }
            let index = u32::from_le_bytes(ix.data[..4].try_into().ok()?);
            if index != SYSTEM_TRANSFER_IX_INDEX {
                return None;
            }
            let lamports = u64::from_le_bytes(ix.data[4..].try_into().ok()?);
            let from = *self.account_keys.get(ix.account_indices[0] as usize)?;
            let to = *self.account_keys.get(ix.account_indices[1] as usize)?;
            Some((from, to, lamports))
        })
    }

    pub fn signer_keys(&self) -> &[[u8; 32]] {
        let count = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..count]
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build a native SOL transfer of `lamports` from `from_pubkey` to
/// `to_pubkey`. The fee payer is the sender.
pub fn build_sol_transfer(
    from_pubkey: &[u8; 32],
    to_pubkey: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    if lamports == 0 {
        return Err(SolError::TransactionBuildError(
            "lamports must be > 0".into(),
        ));
    }
    let instruction = build_system_transfer_instruction(from_pubkey, to_pubkey, lamports);
    compile_transaction(&[instruction], from_pubkey, recent_blockhash)
}

/// Same as [`build_sol_transfer`], with an optional SPL memo attached
/// after the transfer instruction.
pub fn build_sol_transfer_with_memo(
    from_pubkey: &[u8; 32],
    to_pubkey: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
    memo: Option<&str>,
) -> Result<SolTransaction, SolError> {
    let Some(memo) = memo else {
        return build_sol_transfer(from_pubkey, to_pubkey, lamports, recent_blockhash);
    };
    if lamports == 0 {
        return Err(SolError::TransactionBuildError(
            "lamports must be > 0".into(),
        ));
    }
    if memo.len() > MAX_MEMO_LEN {
        return Err(SolError::TransactionBuildError(format!(
            "memo of {} bytes exceeds {MAX_MEMO_LEN}",
            memo.len()
        )));
    }

    let memo_ix = SolInstruction {
        program_id: address_to_bytes(MEMO_PROGRAM_ID)?,
        accounts: Vec::new(),
        data: memo.as_bytes().to_vec(),
    };
    let transfer_ix = build_system_transfer_instruction(from_pubkey, to_pubkey, lamports);
    compile_transaction(&[transfer_ix, memo_ix], from_pubkey, recent_blockhash)
}

fn build_system_transfer_instruction(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
) -> SolInstruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta {
                pubkey: *from,
                is_signer: true,
                is_writable: true,
            },
            SolAccountMeta {
                pubkey: *to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}

/// Compile instructions into a message with a single fee payer at index 0.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &[u8; 32],
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();
    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    upsert(*fee_payer, true, true);
    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    // Stable sort keeps the fee payer first among writable signers.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if entries.len() > u8::MAX as usize {
        return Err(SolError::TransactionBuildError(
            "too many accounts for a legacy message".into(),
        ));
    }

    let count = |pred: fn(&AccountEntry) -> bool| entries.iter().filter(|e| pred(e)).count() as u8;
    let num_required_signatures = count(|e| e.is_signer);
    let num_readonly_signed = count(|e| e.is_signer && !e.is_writable);
    let num_readonly_unsigned = count(|e| !e.is_signer && !e.is_writable);

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &[u8; 32]| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError("account not in account keys".into()))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.push(CompiledInstruction {
            program_id_index: index_of(&ix.program_id)?,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize the message. These are the exact bytes every signer signs.
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, SolError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(compact_len(tx.account_keys.len())?));
    for key in &tx.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(compact_len(
        tx.compiled_instructions.len(),
    )?));
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);
        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.account_indices.len())?));
        buf.extend_from_slice(&ix.account_indices);
        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.data.len())?));
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

fn compact_len(len: usize) -> Result<u16, SolError> {
    u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("length {len} exceeds compact-u16")))
}

/// Prefix the message with one verified signature per required signer.
pub fn assemble_signed_transaction(
    tx: &SolTransaction,
    signatures: &[Vec<u8>],
) -> Result<SignedSolTransaction, SolError> {
    let signers = tx.signer_keys();
    if signatures.len() != signers.len() {
        return Err(SolError::SignatureCountMismatch {
            expected: signers.len(),
            actual: signatures.len(),
        });
    }

    let message = serialize_message(tx)?;
    let mut wire = Vec::with_capacity(3 + signatures.len() * SIGNATURE_LEN + message.len());
    wire.extend_from_slice(&encode_compact_u16(compact_len(signatures.len())?));

    for (index, (raw_sig, key)) in signatures.iter().zip(signers).enumerate() {
        let signature = Signature::from_slice(raw_sig).map_err(|e| {
            SolError::InvalidSignature(format!("signature {index}: {e}"))
        })?;
        let verifying_key = VerifyingKey::from_bytes(key)
            .map_err(|e| SolError::InvalidPublicKey(format!("signer {index}: {e}")))?;
        verifying_key.verify(&message, &signature).map_err(|_| {
            SolError::InvalidSignature(format!(
                "signature {index} does not match {}",
                bytes_to_address(key)
            ))
        })?;
        wire.extend_from_slice(&signature.to_bytes());
    }
    wire.extend_from_slice(&message);

    let signature = signatures
        .first()
        .map(|s| bs58::encode(s).into_string())
        .unwrap_or_default();

    Ok(SignedSolTransaction {
        raw: wire,
        signature,
    })
}

/// Cursor over wire bytes.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SolError> {
        if self.data.len() < n {
            return Err(SolError::SerializationError(format!(
                "unexpected end of data: wanted {n} bytes, {} left",
                self.data.len()
            )));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8, SolError> {
        Ok(self.take(1)?[0])
    }

    fn compact(&mut self) -> Result<usize, SolError> {
        let (value, consumed) = decode_compact_u16(self.data)?;
        self.data = &self.data[consumed..];
        Ok(value as usize)
    }

    fn array32(&mut self) -> Result<[u8; 32], SolError> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32)?);
        Ok(out)
    }
}

/// Decode a wire transaction into its signatures and message.
pub fn decode_transaction(raw: &[u8]) -> Result<DecodedSolTransaction, SolError> {
    let mut reader = Reader { data: raw };

    let num_signatures = reader.compact()?;
    let mut signatures = Vec::with_capacity(num_signatures);
    for _ in 0..num_signatures {
        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(reader.take(SIGNATURE_LEN)?);
        signatures.push(sig);
    }

    let num_required_signatures = reader.byte()?;
    let num_readonly_signed = reader.byte()?;
    let num_readonly_unsigned = reader.byte()?;

    let num_accounts = reader.compact()?;
    let account_keys = (0..num_accounts)
        .map(|_| reader.array32())
        .collect::<Result<Vec<_>, _>>()?;
    let recent_blockhash = reader.array32()?;

    let num_instructions = reader.compact()?;
    let mut compiled_instructions = Vec::with_capacity(num_instructions);
    for _ in 0..num_instructions {
        let program_id_index = reader.byte()?;
        let n = reader.compact()?;
        let account_indices = reader.take(n)?.to_vec();
        let n = reader.compact()?;
        let data = reader.take(n)?.to_vec();
        compiled_instructions.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data,
        });
    }

    if !reader.data.is_empty() {
        return Err(SolError::SerializationError(
            "trailing bytes after message".into(),
        ));
    }

    Ok(DecodedSolTransaction {
        signatures,
        message: SolTransaction {
            account_keys,
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            recent_blockhash,
            compiled_instructions,
        },
    })
}

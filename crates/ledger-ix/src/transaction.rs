//! Transaction wire format and signing.
//!
//! Transactions are built by hand from [`EncodedInstruction`]s. The layout:
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

use ed25519_dalek::VerifyingKey;

use crate::address::Address;
use crate::assembler::EncodedInstruction;
use crate::error::IxError;
use crate::signer::{Signature, TxSigner};

/// Largest serialized transaction the network accepts.
pub const MAX_TRANSACTION_SIZE: usize = 1232;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in the compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
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

/// Decode a compact-u16 value. Returns `(value, bytes_consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), IxError> {
    let mut value: u32 = 0;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            IxError::SerializationError("unexpected end of data while decoding compact-u16".into())
        })?;
        value |= ((byte & 0x7f) as u32) << (7 * consumed);
        consumed += 1;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    let value = u16::try_from(value)
        .map_err(|_| IxError::SerializationError("compact-u16 value overflow".into()))?;
    Ok((value, consumed))
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, IxError> {
    let len = u16::try_from(len)
        .map_err(|_| IxError::TransactionBuildError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(len))
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

/// An instruction with account references replaced by indices into
/// [`Message::account_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// Canonical order: writable signers (fee payer first), read-only
    /// signers, writable non-signers, read-only non-signers.
    pub account_keys: Vec<Address>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Keys that must sign, in signature-slot order.
    pub fn signer_keys(&self) -> &[Address] {
        let n = usize::from(self.header.num_required_signatures).min(self.account_keys.len());
        &self.account_keys[..n]
    }
}

/// Compile instructions into a message paid for by `fee_payer`.
///
/// Accounts referenced more than once are merged; their signer and writable
/// flags are OR-ed together.
pub fn compile_message(
    instructions: &[EncodedInstruction],
    fee_payer: &Address,
    recent_blockhash: &[u8; 32],
) -> Result<Message, IxError> {
    if instructions.is_empty() {
        return Err(IxError::TransactionBuildError("no instructions".into()));
    }

    struct AccountEntry {
        pubkey: Address,
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();
    let mut upsert = |pubkey: Address, signer: bool, writable: bool| {
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

    // Fee payer is always signer + writable, and inserted first so the
    // stable sort below keeps it at index 0.
    upsert(*fee_payer, true, true);

    for ix in instructions {
        for account in &ix.accounts {
            upsert(account.address, account.is_signer, account.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    fn rank(e: &AccountEntry) -> u8 {
        match (e.is_signer, e.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }
    entries.sort_by_key(rank);

    if entries.len() > usize::from(u8::MAX) + 1 {
        return Err(IxError::TransactionBuildError(format!(
            "{} accounts exceed the 256 addressable by index",
            entries.len()
        )));
    }

    let count = |what: &str, pred: fn(&AccountEntry) -> bool| -> Result<u8, IxError> {
        let n = entries.iter().filter(|e| pred(e)).count();
        u8::try_from(n).map_err(|_| {
            IxError::TransactionBuildError(format!("{n} {what} do not fit the message header"))
        })
    };
    let header = MessageHeader {
        num_required_signatures: count("signers", |e| e.is_signer)?,
        num_readonly_signed: count("readonly signers", |e| e.is_signer && !e.is_writable)?,
        num_readonly_unsigned: count("readonly accounts", |e| !e.is_signer && !e.is_writable)?,
    };

    let account_keys: Vec<Address> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &Address| -> Result<u8, IxError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| IxError::TransactionBuildError(format!("{key} not in account keys")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id)?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|a| index_of(&a.address))
            .collect::<Result<Vec<u8>, IxError>>()?;
        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(Message {
        header,
        account_keys,
        recent_blockhash: *recent_blockhash,
        instructions: compiled,
    })
}

/// Serialize the message (the bytes that get signed).
pub fn serialize_message(message: &Message) -> Result<Vec<u8>, IxError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(message.header.num_required_signatures);
    buf.push(message.header.num_readonly_signed);
    buf.push(message.header.num_readonly_unsigned);

    buf.extend_from_slice(&compact_len(message.account_keys.len(), "account keys")?);
    for key in &message.account_keys {
        buf.extend_from_slice(key.as_bytes());
    }

    buf.extend_from_slice(&message.recent_blockhash);

    buf.extend_from_slice(&compact_len(message.instructions.len(), "instructions")?);
    for ix in &message.instructions {
        buf.push(ix.program_id_index);
        buf.extend_from_slice(&compact_len(ix.account_indices.len(), "instruction accounts")?);
        buf.extend_from_slice(&ix.account_indices);
        buf.extend_from_slice(&compact_len(ix.data.len(), "instruction data bytes")?);
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// A signed transaction: signature slots plus the serialized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub signatures: Vec<Signature>,
    pub message: Vec<u8>,
}

impl SignedTransaction {
    /// The transaction id: its first signature.
    pub fn signature(&self) -> Signature {
        self.signatures.first().copied().unwrap_or_default()
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, IxError> {
        let mut wire = compact_len(self.signatures.len(), "signatures")?;
        wire.reserve(self.signatures.len() * 64 + self.message.len());
        for sig in &self.signatures {
            wire.extend_from_slice(sig.as_bytes());
        }
        wire.extend_from_slice(&self.message);

        if wire.len() > MAX_TRANSACTION_SIZE {
            return Err(IxError::TransactionBuildError(format!(
                "transaction is {} bytes, limit is {MAX_TRANSACTION_SIZE}",
                wire.len()
            )));
        }
        Ok(wire)
    }

    /// Split wire bytes back into signature slots and message.
    pub fn from_wire(raw: &[u8]) -> Result<Self, IxError> {
        let (num_sigs, prefix) = decode_compact_u16(raw)?;
        let sigs_end = prefix + usize::from(num_sigs) * 64;
        if sigs_end > raw.len() {
            return Err(IxError::SerializationError(
                "transaction too short: signature slots exceed length".into(),
            ));
        }

        let signatures = raw[prefix..sigs_end]
            .chunks_exact(64)
            .map(|chunk| {
                let mut sig = [0u8; 64];
                sig.copy_from_slice(chunk);
                Signature::new(sig)
            })
            .collect();

        Ok(Self {
            signatures,
            message: raw[sigs_end..].to_vec(),
        })
    }

    /// Keys the message says must sign, read from the message header.
    pub fn signer_keys(&self) -> Result<Vec<Address>, IxError> {
        let header = self.message.get(..3).ok_or_else(|| {
            IxError::SerializationError("transaction message too short".into())
        })?;
        let required = usize::from(header[0]);

        let (num_accounts, used) = decode_compact_u16(&self.message[3..])?;
        let start = 3 + used;
        let end = start + usize::from(num_accounts) * 32;
        if end > self.message.len() || required > usize::from(num_accounts) {
            return Err(IxError::SerializationError(
                "transaction message too short for account keys".into(),
            ));
        }

        self.message[start..end]
            .chunks_exact(32)
            .take(required)
            .map(Address::from_slice)
            .collect()
    }

    /// Check every signature slot against its signer key.
    pub fn verify(&self) -> Result<(), IxError> {
        let keys = self.signer_keys()?;
        if keys.len() != self.signatures.len() {
            return Err(IxError::SigningError(format!(
                "{} signatures for {} required signers",
                self.signatures.len(),
                keys.len()
            )));
        }

        for (key, sig) in keys.iter().zip(&self.signatures) {
            let vk = VerifyingKey::from_bytes(key.as_bytes())
                .map_err(|e| IxError::SigningError(format!("{key}: {e}")))?;
            let sig = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
            vk.verify_strict(&self.message, &sig)
                .map_err(|_| IxError::SigningError(format!("bad signature for {key}")))?;
        }
        Ok(())
    }
}

/// Sign `message` with exactly the signers it requires.
///
/// Every required key must have a signer, and every signer must be required.
pub fn sign_transaction(
    message: &Message,
    signers: &[&dyn TxSigner],
) -> Result<SignedTransaction, IxError> {
    let message_bytes = serialize_message(message)?;
    let required = message.signer_keys();

    for signer in signers {
        let key = signer.pubkey();
        if !required.contains(&key) {
            return Err(IxError::SigningError(format!(
                "{key} is not a signer of this transaction"
            )));
        }
    }

    let mut signatures = Vec::with_capacity(required.len());
    for key in required {
        let signer = signers
            .iter()
            .find(|s| s.pubkey() == *key)
            .ok_or_else(|| IxError::SigningError(format!("missing signer for {key}")))?;
        signatures.push(signer.sign_message(&message_bytes)?);
    }

    Ok(SignedTransaction {
        signatures,
        message: message_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SYSTEM_PROGRAM_ID;
    use crate::resolver::ResolvedAccount;
    use crate::signer::Keypair;

    fn transfer(from: Address, to: Address) -> EncodedInstruction {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&1_000u64.to_le_bytes());
        EncodedInstruction::new(
            SYSTEM_PROGRAM_ID,
            vec![
                ResolvedAccount::new("from", from, true, true),
                ResolvedAccount::writable("to", to),
            ],
            data,
        )
    }

    // -- compact-u16 --------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(128), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(16383), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn decode_compact_u16_values() {
        assert_eq!(decode_compact_u16(&[0x7f]).unwrap(), (127, 1));
        assert_eq!(decode_compact_u16(&[0x80, 0x01]).unwrap(), (128, 2));
        assert_eq!(decode_compact_u16(&[0x80, 0x80, 0x01]).unwrap(), (16384, 3));
    }

    #[test]
    fn decode_compact_u16_errors() {
        assert!(decode_compact_u16(&[]).is_err());
        assert!(decode_compact_u16(&[0x80]).is_err());
        assert!(decode_compact_u16(&[0xff, 0xff, 0x7f]).is_err());
    }

    // -- Compilation --------------------------------------------------------

    #[test]
    fn fee_payer_first_and_header_counts() {
        let from = Address::new([1; 32]);
        let to = Address::new([2; 32]);
        let msg = compile_message(&[transfer(from, to)], &from, &[0xaa; 32]).unwrap();

        assert_eq!(msg.account_keys, vec![from, to, SYSTEM_PROGRAM_ID]);
        assert_eq!(msg.header.num_required_signatures, 1);
        assert_eq!(msg.header.num_readonly_signed, 0);
        assert_eq!(msg.header.num_readonly_unsigned, 1);
        assert_eq!(msg.instructions[0].program_id_index, 2);
        assert_eq!(msg.instructions[0].account_indices, vec![0, 1]);
    }

    #[test]
    fn separate_fee_payer_takes_slot_zero() {
        let payer = Address::new([9; 32]);
        let from = Address::new([1; 32]);
        let to = Address::new([2; 32]);
        let msg = compile_message(&[transfer(from, to)], &payer, &[0; 32]).unwrap();

        assert_eq!(msg.account_keys[0], payer);
        assert_eq!(msg.signer_keys(), &[payer, from]);
        assert_eq!(msg.instructions[0].account_indices, vec![1, 2]);
    }

    #[test]
    fn duplicate_accounts_merge_flags() {
        let key = Address::new([1; 32]);
        let msg = compile_message(&[transfer(key, key)], &key, &[0; 32]).unwrap();
        assert_eq!(msg.account_keys.len(), 2);
        assert_eq!(msg.header.num_required_signatures, 1);
    }

    #[test]
    fn readonly_signer_ranks_after_writable_signers() {
        let payer = Address::new([9; 32]);
        let authority = Address::new([4; 32]);
        let ix = EncodedInstruction::new(
            Address::new([7; 32]),
            vec![
                ResolvedAccount::writable("metadata", Address::new([5; 32])),
                ResolvedAccount::new("authority", authority, true, false),
            ],
            vec![15],
        );
        let msg = compile_message(&[ix], &payer, &[0; 32]).unwrap();
        assert_eq!(msg.account_keys[..2], [payer, authority]);
        assert_eq!(msg.header.num_readonly_signed, 1);
        assert_eq!(msg.header.num_readonly_unsigned, 1);
    }

    #[test]
    fn empty_instruction_list_rejected() {
        assert!(compile_message(&[], &Address::new([1; 32]), &[0; 32]).is_err());
    }

    #[test]
    fn message_contains_blockhash_after_keys() {
        let from = Address::new([1; 32]);
        let msg = compile_message(&[transfer(from, Address::new([2; 32]))], &from, &[0xcc; 32])
            .unwrap();
        let bytes = serialize_message(&msg).unwrap();
        let offset = 3 + 1 + 32 * msg.account_keys.len();
        assert_eq!(&bytes[offset..offset + 32], &[0xcc; 32]);
    }

    // -- Signing ------------------------------------------------------------

    #[test]
    fn single_signer_wire_verifies() {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let msg = compile_message(&[transfer(kp.pubkey(), Address::new([2; 32]))], &kp.pubkey(), &[0xcc; 32])
            .unwrap();
        let signed = sign_transaction(&msg, &[&kp]).unwrap();
        let wire = signed.to_wire().unwrap();

        assert_eq!(wire[0], 0x01);
        let parsed = SignedTransaction::from_wire(&wire).unwrap();
        assert_eq!(parsed, signed);
        parsed.verify().unwrap();
        assert_eq!(parsed.signature(), signed.signatures[0]);
    }

    #[test]
    fn two_signers_fill_slots_in_key_order() {
        let payer = Keypair::from_seed(&[1; 32]);
        let from = Keypair::from_seed(&[2; 32]);
        let msg = compile_message(&[transfer(from.pubkey(), Address::new([3; 32]))], &payer.pubkey(), &[0; 32])
            .unwrap();

        // Signer order in the slice does not matter.
        let signed = sign_transaction(&msg, &[&from, &payer]).unwrap();
        assert_eq!(signed.signatures.len(), 2);
        assert_eq!(signed.signer_keys().unwrap(), vec![payer.pubkey(), from.pubkey()]);
        signed.verify().unwrap();
    }

    #[test]
    fn missing_signer_rejected() {
        let payer = Keypair::from_seed(&[1; 32]);
        let from = Address::new([2; 32]);
        let msg = compile_message(&[transfer(from, Address::new([3; 32]))], &payer.pubkey(), &[0; 32])
            .unwrap();
        let err = sign_transaction(&msg, &[&payer]).unwrap_err();
        assert!(err.to_string().contains("missing signer"));
    }

    #[test]
    fn unexpected_signer_rejected() {
        let payer = Keypair::from_seed(&[1; 32]);
        let stranger = Keypair::from_seed(&[5; 32]);
        let msg = compile_message(&[transfer(payer.pubkey(), Address::new([3; 32]))], &payer.pubkey(), &[0; 32])
            .unwrap();
        let err = sign_transaction(&msg, &[&payer, &stranger]).unwrap_err();
        assert!(err.to_string().contains("is not a signer"));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let msg = compile_message(&[transfer(kp.pubkey(), Address::new([2; 32]))], &kp.pubkey(), &[0; 32])
            .unwrap();
        let mut signed = sign_transaction(&msg, &[&kp]).unwrap();
        let last = signed.message.len() - 1;
        signed.message[last] ^= 1;
        assert!(signed.verify().is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = Keypair::from_seed(&[0x55; 32]);
        let msg = compile_message(&[transfer(kp.pubkey(), Address::new([7; 32]))], &kp.pubkey(), &[0x99; 32])
            .unwrap();
        assert_eq!(
            sign_transaction(&msg, &[&kp]).unwrap(),
            sign_transaction(&msg, &[&kp]).unwrap()
        );
    }

    #[test]
    fn oversized_transaction_rejected() {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let ix = EncodedInstruction::new(
            Address::new([7; 32]),
            vec![ResolvedAccount::new("payer", kp.pubkey(), true, true)],
            vec![0u8; 1200],
        );
        let msg = compile_message(&[ix], &kp.pubkey(), &[0; 32]).unwrap();
        let signed = sign_transaction(&msg, &[&kp]).unwrap();
        assert!(matches!(signed.to_wire(), Err(IxError::TransactionBuildError(_))));
    }

    #[test]
    fn too_many_signers_rejected_not_wrapped() {
        let payer = Address::new([1; 32]);
        let program = Address::new([2; 32]);
        let mut accounts = vec![ResolvedAccount::new("program", program, true, false)];
        for i in 0..254u32 {
            let mut raw = [0u8; 32];
            raw[..4].copy_from_slice(&i.to_le_bytes());
            raw[31] = 0xff;
            accounts.push(ResolvedAccount::new("signer", Address::new(raw), true, false));
        }
        let ix = EncodedInstruction::new(program, accounts, vec![]);

        // payer + program + 254 others: 256 entries, every one a signer
        match compile_message(&[ix], &payer, &[0; 32]) {
            Err(IxError::TransactionBuildError(msg)) => assert!(msg.contains("256 signers")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_wire_rejected() {
        assert!(SignedTransaction::from_wire(&[]).is_err());
        assert!(SignedTransaction::from_wire(&[0x01, 0x00]).is_err());
    }
}

//! SPL Token, Associated Token Account and System program instructions.
//!
//! Only the handful of instructions the sale workflows need, built without
//! the `spl-token` or `solana-sdk` crates.

use ledger_ix::{
    Address, AddressDeriver, EncodedInstruction, IxError, ResolvedAccount, SYSTEM_PROGRAM_ID,
};

use crate::state::MintState;

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Address = Address::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
]);

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address = Address::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
]);

const SYSTEM_CREATE_ACCOUNT: u32 = 0;
const TOKEN_INITIALIZE_MINT2: u8 = 20;
const ATA_CREATE_IDEMPOTENT: u8 = 1;

// ---------------------------------------------------------------------------
// System program
// ---------------------------------------------------------------------------

/// System `CreateAccount`: fund `new_account` with `lamports`, allocate
/// `space` bytes and assign it to `owner`. Both accounts sign.
///
/// # Wire format
///
/// u32 LE instruction index (0), u64 LE lamports, u64 LE space, 32-byte owner.
pub fn create_account(
    payer: &Address,
    new_account: &Address,
    lamports: u64,
    space: u64,
    owner: &Address,
) -> EncodedInstruction {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_bytes());

    EncodedInstruction::new(
        SYSTEM_PROGRAM_ID,
        vec![
            ResolvedAccount::new("payer", *payer, true, true),
            ResolvedAccount::new("new_account", *new_account, true, true),
        ],
        data,
    )
}

// ---------------------------------------------------------------------------
// SPL Token
// ---------------------------------------------------------------------------

/// SPL Token `InitializeMint2`. Unlike `InitializeMint` it needs no rent
/// sysvar account.
pub fn initialize_mint2(
    mint: &Address,
    decimals: u8,
    mint_authority: &Address,
    freeze_authority: Option<&Address>,
) -> EncodedInstruction {
    let mut data = Vec::with_capacity(67);
    data.push(TOKEN_INITIALIZE_MINT2);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(freeze) => {
            data.push(1);
            data.extend_from_slice(freeze.as_bytes());
        }
        None => data.push(0),
    }

    EncodedInstruction::new(
        TOKEN_PROGRAM_ID,
        vec![ResolvedAccount::writable("mint", *mint)],
        data,
    )
}

/// The two instructions that bring a fresh mint account to life.
pub fn create_mint_instructions(
    payer: &Address,
    mint: &Address,
    rent_lamports: u64,
    decimals: u8,
    mint_authority: &Address,
) -> Vec<EncodedInstruction> {
    vec![
        create_account(payer, mint, rent_lamports, MintState::LEN as u64, &TOKEN_PROGRAM_ID),
        initialize_mint2(mint, decimals, mint_authority, None),
    ]
}

// ---------------------------------------------------------------------------
// Associated Token Account
// ---------------------------------------------------------------------------

/// Derive the associated token account for a wallet + mint pair.
///
/// Seeds: `[wallet, token_program_id, mint]` under the ATA program.
pub fn associated_token_address(
    deriver: &AddressDeriver,
    wallet: &Address,
    mint: &Address,
) -> Result<Address, IxError> {
    deriver
        .derive(
            &ASSOCIATED_TOKEN_PROGRAM_ID,
            &[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        )
        .map(|(address, _bump)| address)
}

/// ATA `CreateIdempotent`: succeeds when the account already exists.
pub fn create_associated_token_account_idempotent(
    payer: &Address,
    associated_account: &Address,
    wallet: &Address,
    mint: &Address,
) -> EncodedInstruction {
    EncodedInstruction::new(
        ASSOCIATED_TOKEN_PROGRAM_ID,
        vec![
            ResolvedAccount::new("payer", *payer, true, true),
            ResolvedAccount::writable("associated_token_account", *associated_account),
            ResolvedAccount::readonly("wallet", *wallet),
            ResolvedAccount::readonly("mint", *mint),
            ResolvedAccount::readonly("system_program", SYSTEM_PROGRAM_ID),
            ResolvedAccount::readonly("token_program", TOKEN_PROGRAM_ID),
        ],
        vec![ATA_CREATE_IDEMPOTENT],
    )
}

//! The program's custom error codes.
//!
//! A failed simulation only reports `custom program error: 0x1770`; this table
//! turns that back into something an operator can act on.

use ledger_ix::IxError;
use thiserror::Error;

/// First custom error code the program uses.
pub const ERROR_CODE_OFFSET: u32 = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ProgramError {
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("sale end not in the allowed range")]
    SaleEndNotInRange,
    #[error("minimum supply is too large")]
    MinSupplyTooLarge,
    #[error("mint has no mint authority set")]
    MintAuthorityMissing,
    #[error("mint authority does not match the program's PDA")]
    WrongMintAuthority,
    #[error("freeze authority must be revoked before initialization")]
    FreezeNotRevoked,
    #[error("mint has unexpected decimals")]
    WrongDecimals,
    #[error("mint has non-zero supply at initialization")]
    NonZeroInitialSupply,
    #[error("account owner must be the system program")]
    InvalidOwner,
    #[error("account must have zero data length")]
    NonZeroData,
    #[error("wrong mint passed")]
    WrongMint,
    #[error("wrong SOL vault for this config")]
    WrongSolVault,
    #[error("mint authority must be admin")]
    MintAuthorityMustBeAdmin,
    #[error("no SOL sent")]
    NoSolSent,
    #[error("insufficient tokens available in vault")]
    VaultInsufficient,
    #[error("zero token redeem")]
    ZeroTokenRedeem,
    #[error("insufficient tokens")]
    InsufficientTokens,
    #[error("not enough SOL in vault")]
    VaultSolInsufficient,
    #[error("invalid mint")]
    InvalidMint,
    #[error("invalid SOL vault address")]
    InvalidVault,
    #[error("not initialized")]
    NotInitialized,
    #[error("wrong token vault account for this config")]
    WrongTokenVaultAccount,
    #[error("token vault does not own token vault account")]
    WrongVaultAuthority,
    #[error("wrong token vault for this config")]
    WrongTokenVault,
}

impl ProgramError {
    /// Declaration order; index + [`ERROR_CODE_OFFSET`] is the wire code.
    pub const ALL: [ProgramError; 24] = [
        ProgramError::AlreadyInitialized,
        ProgramError::SaleEndNotInRange,
        ProgramError::MinSupplyTooLarge,
        ProgramError::MintAuthorityMissing,
        ProgramError::WrongMintAuthority,
        ProgramError::FreezeNotRevoked,
        ProgramError::WrongDecimals,
        ProgramError::NonZeroInitialSupply,
        ProgramError::InvalidOwner,
        ProgramError::NonZeroData,
        ProgramError::WrongMint,
        ProgramError::WrongSolVault,
        ProgramError::MintAuthorityMustBeAdmin,
        ProgramError::NoSolSent,
        ProgramError::VaultInsufficient,
        ProgramError::ZeroTokenRedeem,
        ProgramError::InsufficientTokens,
        ProgramError::VaultSolInsufficient,
        ProgramError::InvalidMint,
        ProgramError::InvalidVault,
        ProgramError::NotInitialized,
        ProgramError::WrongTokenVaultAccount,
        ProgramError::WrongVaultAuthority,
        ProgramError::WrongTokenVault,
    ];

    pub fn code(self) -> u32 {
        ERROR_CODE_OFFSET + self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let index = code.checked_sub(ERROR_CODE_OFFSET)?;
        Self::ALL.get(index as usize).copied()
    }

    /// Find a program error in a submission failure's message or logs.
    ///
    /// Recognises the runtime's `custom program error: 0x..` form and the
    /// framework's `Error Number: ....` log line.
    pub fn from_failure(err: &IxError) -> Option<Self> {
        let IxError::SubmissionFailure { message, logs } = err else {
            return None;
        };
        std::iter::once(message.as_str())
            .chain(logs.iter().map(String::as_str))
            .find_map(|line| parse_code(line).and_then(Self::from_code))
    }
}

fn parse_code(line: &str) -> Option<u32> {
    if let Some((_, rest)) = line.split_once("custom program error: 0x") {
        let hex: String = rest.chars().take_while(char::is_ascii_hexdigit).collect();
        return u32::from_str_radix(&hex, 16).ok();
    }
    if let Some((_, rest)) = line.split_once("Error Number: ") {
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        return digits.parse().ok();
    }
    None
}

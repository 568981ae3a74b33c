//! Program identity: the default deployment, sale parameters, the embedded
//! IDL and the program's own derived addresses.

use ledger_ix::{Address, AddressDeriver, IxError, ProgramSchema};
use serde::Serialize;

/// Default deployment: `6crPEdUww61S2GifdDKHWkFiZXw1EdFu8zR6XBXFjKL3`
pub const FAIR_TOKEN_PROGRAM_ID: Address = Address::new([
    0x53, 0x79, 0x99, 0xd4, 0x39, 0xc6, 0x87, 0x4d, 0x2f, 0xaa, 0x89, 0xb2, 0x93, 0x54, 0x3c,
    0x8d, 0x7b, 0x0d, 0x09, 0x67, 0xca, 0xd8, 0x6a, 0xd7, 0x55, 0x3c, 0xed, 0x4a, 0x7d, 0x9e,
    0xe5, 0x88,
]);

/// The only key the default deployment accepts as `initialize` admin:
/// `7kj6VagrS2AdohX3nsSazdsdgj6d1Sqh1fJqZHLMi3sK`
pub const ADMIN: Address = Address::new([
    0x64, 0x59, 0xb1, 0x67, 0x2f, 0x81, 0x81, 0x8f, 0xb7, 0xb4, 0x2a, 0xa6, 0xc0, 0xc5, 0xca,
    0xcb, 0x65, 0x6c, 0x22, 0xda, 0x67, 0x24, 0xe1, 0x17, 0xdf, 0x51, 0x9d, 0xdd, 0x41, 0xe3,
    0xcc, 0x36,
]);

/// 1 lamport buys 1 base unit, so 1 token costs 1 SOL.
pub const DECIMALS: u8 = 9;
pub const MIN_SUPPLY_TOKENS: u64 = 100_000;
pub const MIN_SALE_WINDOW_DAYS: i64 = 45;
pub const MAX_SALE_WINDOW_DAYS: i64 = 90;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub const CONFIG_SEED: &[u8] = b"config";
pub const MINT_AUTHORITY_SEED: &[u8] = b"mint_authority";
pub const SOL_VAULT_SEED: &[u8] = b"sol_vault";
pub const TOKEN_VAULT_SEED: &[u8] = b"token_vault";

/// Anchor IDL for the deployed program.
pub const IDL_JSON: &str = include_str!("../idl/fair_token.json");

pub fn embedded_schema() -> Result<ProgramSchema, IxError> {
    ProgramSchema::from_idl_json(IDL_JSON)
}

/// Accepted `sale_end` range for an initialize submitted at `now`.
pub fn sale_end_window(now: i64) -> (i64, i64) {
    (
        now + MIN_SALE_WINDOW_DAYS * SECONDS_PER_DAY,
        now + MAX_SALE_WINDOW_DAYS * SECONDS_PER_DAY,
    )
}

/// The program's single-seed PDAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramAddresses {
    pub program_id: Address,
    pub config: Address,
    pub mint_authority: Address,
    pub sol_vault: Address,
    pub token_vault: Address,
}

impl ProgramAddresses {
    pub fn derive(deriver: &AddressDeriver, program_id: &Address) -> Result<Self, IxError> {
        let pda = |seed: &[u8]| deriver.derive(program_id, &[seed]).map(|(a, _)| a);
        Ok(Self {
            program_id: *program_id,
            config: pda(CONFIG_SEED)?,
            mint_authority: pda(MINT_AUTHORITY_SEED)?,
            sol_vault: pda(SOL_VAULT_SEED)?,
            token_vault: pda(TOKEN_VAULT_SEED)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_program_id_roundtrip() {
        assert_eq!(
            FAIR_TOKEN_PROGRAM_ID.to_string(),
            "6crPEdUww61S2GifdDKHWkFiZXw1EdFu8zR6XBXFjKL3"
        );
        assert_eq!(ADMIN.to_string(), "7kj6VagrS2AdohX3nsSazdsdgj6d1Sqh1fJqZHLMi3sK");
    }

    #[test]
    fn embedded_idl_matches_default_deployment() {
        let schema = embedded_schema().unwrap();
        assert_eq!(schema.name(), "fair_token");
        assert_eq!(schema.program_id(), Some(FAIR_TOKEN_PROGRAM_ID));

        let names: Vec<&str> = schema.operations().iter().map(|o| o.name.as_str()).collect();
        assert!(names.contains(&"initialize"));
        assert!(names.contains(&"buy_fair_token"));
        assert!(names.contains(&"redeem_fair_token"));
    }

    #[test]
    fn embedded_idl_account_lists() {
        let schema = embedded_schema().unwrap();
        let init = schema.operation("initialize").unwrap();
        let roles: Vec<&str> = init.accounts.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            roles,
            [
                "admin",
                "mint",
                "mint_authority",
                "config",
                "sol_vault",
                "token_vault",
                "token_vault_account",
                "token_program",
                "system_program",
            ]
        );
        assert!(init.accounts[6].signer);
        assert_eq!(init.args[0].type_name(), "i64");

        let buy = schema.operation("buy_fair_token").unwrap();
        assert_eq!(buy.accounts.len(), 10);
        assert!(buy.accounts[0].signer && buy.accounts[0].writable);
        assert!(!buy.accounts[2].writable, "mint_authority is read-only");
    }

    #[test]
    fn program_pdas_known_vectors() {
        let pdas = ProgramAddresses::derive(&AddressDeriver::new(), &FAIR_TOKEN_PROGRAM_ID).unwrap();
        assert_eq!(pdas.config.to_string(), "HTBE4SWc2tr1uFX8JdZNRoNB6RCzgXySz3KyDj5Z3hmB");
        assert_eq!(pdas.mint_authority.to_string(), "EZ6YauXpe6eih9gzYzSrE5ZxtRPdH4yy91yKUvbRa4rT");
        assert_eq!(pdas.sol_vault.to_string(), "6Wh5h17bSevBG8VdKqwEcTeX1zrJMvU33c1L1dy2b6s7");
        assert_eq!(pdas.token_vault.to_string(), "6rWE79ShRuKpvA7FvorZWZiiLszYMBwhtc6sDoini661");
    }

    #[test]
    fn sale_window_bounds() {
        let (min, max) = sale_end_window(1_000);
        assert_eq!(min, 1_000 + 45 * 86_400);
        assert_eq!(max, 1_000 + 90 * 86_400);
    }
}

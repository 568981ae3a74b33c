//! Descriptor-driven instructions for the sale program.
//!
//! Each builder fills a [`RoleBindingTable`] and lets the
//! [`InstructionBuilder`] resolve, order and flag the accounts exactly as the
//! IDL declares them. Program PDAs are bound as derived seeds; the token and
//! system programs come from the IDL's fixed addresses.

use std::sync::Arc;

use ledger_ix::{
    Address, AddressDeriver, Binding, EncodedInstruction, InstructionBuilder, IxError,
    ProgramSchema, RoleBindingTable,
};

use crate::program::{
    embedded_schema, ProgramAddresses, ADMIN, CONFIG_SEED, FAIR_TOKEN_PROGRAM_ID,
    MINT_AUTHORITY_SEED, SOL_VAULT_SEED, TOKEN_VAULT_SEED,
};
use crate::spl_token::associated_token_address;

pub const INITIALIZE: &str = "initialize";
pub const BUY: &str = "buy_fair_token";
pub const REDEEM: &str = "redeem_fair_token";

/// Accounts the program recorded in `Config` at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleAccounts {
    pub mint: Address,
    pub token_vault_account: Address,
}

/// Instruction builders bound to one deployment of the program.
#[derive(Debug, Clone)]
pub struct FairTokenProgram {
    builder: InstructionBuilder,
    addresses: ProgramAddresses,
    admin: Option<Address>,
}

impl FairTokenProgram {
    pub fn new(
        program_id: Address,
        schema: Arc<ProgramSchema>,
        deriver: AddressDeriver,
    ) -> Result<Self, IxError> {
        let addresses = ProgramAddresses::derive(&deriver, &program_id)?;
        Ok(Self {
            builder: InstructionBuilder::new(program_id, schema, deriver),
            addresses,
            admin: (program_id == FAIR_TOKEN_PROGRAM_ID).then_some(ADMIN),
        })
    }

    /// Key `initialize` is gated to. The default deployment gates on
    /// [`ADMIN`]; other deployments are ungated unless set here.
    pub fn with_admin(mut self, admin: Option<Address>) -> Self {
        self.admin = admin;
        self
    }

    pub fn admin(&self) -> Option<Address> {
        self.admin
    }

    /// Embedded IDL; `program_id` overrides the address it declares.
    pub fn embedded(program_id: Option<Address>) -> Result<Self, IxError> {
        let schema = embedded_schema()?;
        let program_id = match program_id.or(schema.program_id()) {
            Some(id) => id,
            None => {
                return Err(IxError::InvalidDescriptor(
                    "IDL declares no program address".into(),
                ))
            }
        };
        Self::new(program_id, Arc::new(schema), AddressDeriver::new())
    }

    pub fn program_id(&self) -> Address {
        self.builder.program_id()
    }

    pub fn addresses(&self) -> &ProgramAddresses {
        &self.addresses
    }

    pub fn builder(&self) -> &InstructionBuilder {
        &self.builder
    }

    pub fn deriver(&self) -> &AddressDeriver {
        self.builder.deriver()
    }

    /// Bindings shared by every operation: the program PDAs.
    pub fn base_bindings(&self) -> Result<RoleBindingTable, IxError> {
        let program_id = self.program_id();
        RoleBindingTable::new()
            .with("mint_authority", Binding::derived(program_id, &[MINT_AUTHORITY_SEED]))?
            .with("config", Binding::derived(program_id, &[CONFIG_SEED]))?
            .with("sol_vault", Binding::derived(program_id, &[SOL_VAULT_SEED]))?
            .with("token_vault", Binding::derived(program_id, &[TOKEN_VAULT_SEED]))
    }

    /// `initialize(sale_end)`. `token_vault_account` is a fresh keypair the
    /// program creates, so it signs.
    pub fn initialize(
        &self,
        admin: &Address,
        mint: &Address,
        token_vault_account: &Address,
        sale_end: i64,
    ) -> Result<EncodedInstruction, IxError> {
        let table = self
            .base_bindings()?
            .with("admin", Binding::signer(*admin))?
            .with("mint", Binding::address(*mint))?
            .with("token_vault_account", Binding::signer(*token_vault_account))?;
        self.builder.build(INITIALIZE, &table, &[i128::from(sale_end)])
    }

    /// `buy_fair_token(lamports_sent)` into the buyer's associated account.
    pub fn buy(
        &self,
        buyer: &Address,
        sale: &SaleAccounts,
        lamports_sent: u64,
    ) -> Result<EncodedInstruction, IxError> {
        let table = self.trade_bindings("buyer", buyer, sale)?;
        self.builder.build(BUY, &table, &[i128::from(lamports_sent)])
    }

    /// `redeem_fair_token(amount_to_redeem)` from the redeemer's associated
    /// account.
    pub fn redeem(
        &self,
        redeemer: &Address,
        sale: &SaleAccounts,
        amount_to_redeem: u64,
    ) -> Result<EncodedInstruction, IxError> {
        let table = self.trade_bindings("redeemer", redeemer, sale)?;
        self.builder.build(REDEEM, &table, &[i128::from(amount_to_redeem)])
    }

    fn trade_bindings(
        &self,
        user_role: &str,
        user: &Address,
        sale: &SaleAccounts,
    ) -> Result<RoleBindingTable, IxError> {
        let user_token_account = associated_token_address(self.deriver(), user, &sale.mint)?;
        self.base_bindings()?
            .with(user_role, Binding::signer(*user))?
            .with("mint", Binding::address(sale.mint))?
            .with("token_vault_account", Binding::address(sale.token_vault_account))?
            .with("user_token_account", Binding::address(user_token_account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::FAIR_TOKEN_PROGRAM_ID;
    use crate::spl_token::TOKEN_PROGRAM_ID;
    use ledger_ix::{derive_selector, SYSTEM_PROGRAM_ID};

    fn program() -> FairTokenProgram {
        FairTokenProgram::embedded(None).unwrap()
    }

    fn sale() -> SaleAccounts {
        SaleAccounts {
            mint: Address::new([7; 32]),
            token_vault_account: Address::new([8; 32]),
        }
    }

    // -- initialize ---------------------------------------------------------

    #[test]
    fn initialize_layout() {
        let p = program();
        let admin = Address::new([1; 32]);
        let tva = Address::new([8; 32]);
        let ix = p.initialize(&admin, &Address::new([7; 32]), &tva, 1_767_225_600).unwrap();

        assert_eq!(ix.program_id, FAIR_TOKEN_PROGRAM_ID);
        assert_eq!(hex::encode(&ix.data[..8]), "afaf6d1f0d989bed");
        assert_eq!(&ix.data[8..], &1_767_225_600i64.to_le_bytes());

        let addrs: Vec<Address> = ix.accounts.iter().map(|a| a.address).collect();
        assert_eq!(addrs[0], admin);
        assert_eq!(addrs[2], p.addresses().mint_authority);
        assert_eq!(addrs[3], p.addresses().config);
        assert_eq!(addrs[4], p.addresses().sol_vault);
        assert_eq!(addrs[5], p.addresses().token_vault);
        assert_eq!(addrs[6], tva);
        assert_eq!(addrs[7], TOKEN_PROGRAM_ID);
        assert_eq!(addrs[8], SYSTEM_PROGRAM_ID);

        let signers: Vec<&Address> = ix.signers().collect();
        assert_eq!(signers, vec![&admin, &tva]);
    }

    #[test]
    fn initialize_accepts_negative_timestamps() {
        let ix = program()
            .initialize(&Address::new([1; 32]), &Address::new([7; 32]), &Address::new([8; 32]), -1)
            .unwrap();
        assert_eq!(&ix.data[8..], &[0xff; 8]);
    }

    // -- buy / redeem -------------------------------------------------------

    #[test]
    fn buy_layout() {
        let p = program();
        let buyer = Address::new([0x42; 32]);
        let ix = p.buy(&buyer, &sale(), 1_000_000_000).unwrap();

        assert_eq!(&ix.data[..8], &derive_selector("buy_fair_token").unwrap());
        assert_eq!(&ix.data[8..], &1_000_000_000u64.to_le_bytes());
        assert_eq!(ix.accounts.len(), 10);
        assert_eq!(ix.accounts[0].address, buyer);
        assert!(ix.accounts[0].is_signer);
        assert!(!ix.accounts[2].is_writable);
        assert_eq!(
            ix.accounts[7].address.to_string(),
            "GbFJsymwbEWePe2Tu2aMQJtyTiZAdfJZtvxbFN68upf1"
        );
        assert_eq!(ix.signers().count(), 1);
    }

    #[test]
    fn redeem_uses_redeemer_role() {
        let p = program();
        let redeemer = Address::new([0x42; 32]);
        let ix = p.redeem(&redeemer, &sale(), 5).unwrap();
        assert_eq!(hex::encode(&ix.data[..8]), "6b22213d7797198a");
        assert_eq!(ix.accounts[0].role, "redeemer");
        assert_eq!(ix.accounts[6].address, sale().token_vault_account);
    }

    #[test]
    fn program_id_override_moves_pdas() {
        let other = Address::new([3; 32]);
        let p = FairTokenProgram::embedded(Some(other)).unwrap();
        assert_eq!(p.program_id(), other);
        assert_ne!(p.addresses().config, program().addresses().config);

        let ix = p.buy(&Address::new([1; 32]), &sale(), 1).unwrap();
        assert_eq!(ix.program_id, other);
        assert_eq!(ix.accounts[3].address, p.addresses().config);
    }

    #[test]
    fn only_default_deployment_is_admin_gated() {
        assert_eq!(program().admin(), Some(ADMIN));

        let other = FairTokenProgram::embedded(Some(Address::new([3; 32]))).unwrap();
        assert_eq!(other.admin(), None);

        let gated = other.with_admin(Some(Address::new([1; 32])));
        assert_eq!(gated.admin(), Some(Address::new([1; 32])));
    }

    #[test]
    fn missing_binding_names_role() {
        let p = program();
        let mut table = p.trade_bindings("buyer", &Address::new([1; 32]), &sale()).unwrap();
        assert!(table.remove("solVault").is_some());
        let err = p.builder().build(BUY, &table, &[1]).unwrap_err();
        assert!(matches!(err, IxError::MissingAccountBinding { role } if role == "sol_vault"));
    }
}

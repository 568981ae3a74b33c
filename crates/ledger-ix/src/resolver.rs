//! Account resolution.
//!
//! Maps the logical account roles of an [`OperationDescriptor`] onto concrete
//! addresses with effective signer/writable flags. Role names are matched
//! leniently (`token_vault_account`, `tokenVaultAccount` and
//! `token-vault-account` are the same role), but two spellings may never
//! point at different targets.
//!
//! [`OperationDescriptor`]: crate::descriptor::OperationDescriptor

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::descriptor::AccountRole;
use crate::error::IxError;
use crate::pda::AddressDeriver;

/// Canonical key for a role or operation name: lower-case with `_` and `-`
/// removed.
pub fn normalize_role_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// `token_vault_account` -> `tokenVaultAccount`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' || c == '-' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Where a role's address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    Literal(Address),
    /// Program-derived; resolved through the shared [`AddressDeriver`].
    Derived {
        program_id: Address,
        seeds: Vec<Vec<u8>>,
    },
}

/// A role binding with optional flag overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub target: BindingTarget,
    pub signer: Option<bool>,
    pub writable: Option<bool>,
}

impl Binding {
    pub fn address(address: Address) -> Self {
        Self {
            target: BindingTarget::Literal(address),
            signer: None,
            writable: None,
        }
    }

    /// A literal address that must sign.
    pub fn signer(address: Address) -> Self {
        Self::address(address).with_signer(true)
    }

    pub fn derived<S: AsRef<[u8]>>(program_id: Address, seeds: &[S]) -> Self {
        Self {
            target: BindingTarget::Derived {
                program_id,
                seeds: seeds.iter().map(|s| s.as_ref().to_vec()).collect(),
            },
            signer: None,
            writable: None,
        }
    }

    pub fn with_signer(mut self, signer: bool) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            BindingTarget::Literal(address) => write!(f, "{address}")?,
            BindingTarget::Derived { program_id, seeds } => {
                let seeds: Vec<String> = seeds.iter().map(hex::encode).collect();
                write!(f, "pda({program_id}, [{}])", seeds.join(", "))?
            }
        }
        if let Some(signer) = self.signer {
            write!(f, " signer={signer}")?;
        }
        if let Some(writable) = self.writable {
            write!(f, " writable={writable}")?;
        }
        Ok(())
    }
}

/// Per-invocation map from role name to [`Binding`].
#[derive(Debug, Clone, Default)]
pub struct RoleBindingTable {
    exact: HashMap<String, Binding>,
    canonical: HashMap<String, (String, Binding)>,
}

impl RoleBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`. Re-binding any spelling of the same role to the same
    /// target is a no-op; to a different target is a [`IxError::ConflictingBinding`].
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) -> Result<(), IxError> {
        let name = name.into();
        let key = normalize_role_name(&name);

        if let Some((existing_name, existing)) = self.canonical.get(&key) {
            if *existing != binding {
                return Err(IxError::ConflictingBinding {
                    name,
                    existing: format!("{existing_name} = {existing}"),
                    new: binding.to_string(),
                });
            }
        } else {
            self.canonical.insert(key, (name.clone(), binding.clone()));
        }

        self.exact.insert(name, binding);
        Ok(())
    }

    /// Builder form of [`bind`](Self::bind).
    pub fn with(mut self, name: impl Into<String>, binding: Binding) -> Result<Self, IxError> {
        self.bind(name, binding)?;
        Ok(self)
    }

    /// Drop every spelling of a role.
    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        let key = normalize_role_name(name);
        let (_, binding) = self.canonical.remove(&key)?;
        self.exact.retain(|k, _| normalize_role_name(k) != key);
        Some(binding)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Exact name, then camel-case spelling, then normalized key.
    pub fn lookup(&self, role: &str) -> Option<&Binding> {
        self.exact
            .get(role)
            .or_else(|| self.exact.get(&to_camel_case(role)))
            .or_else(|| {
                self.canonical
                    .get(&normalize_role_name(role))
                    .map(|(_, b)| b)
            })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// An account slot with its final address and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAccount {
    pub role: String,
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl ResolvedAccount {
    pub fn new(role: impl Into<String>, address: Address, is_signer: bool, is_writable: bool) -> Self {
        Self {
            role: role.into(),
            address,
            is_signer,
            is_writable,
        }
    }

    pub fn readonly(role: impl Into<String>, address: Address) -> Self {
        Self::new(role, address, false, false)
    }

    pub fn writable(role: impl Into<String>, address: Address) -> Self {
        Self::new(role, address, false, true)
    }
}

/// Resolves descriptor roles against a binding table.
#[derive(Debug, Clone, Default)]
pub struct AccountResolver {
    deriver: AddressDeriver,
}

impl AccountResolver {
    pub fn new(deriver: AddressDeriver) -> Self {
        Self { deriver }
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    /// Resolve every role, in order. The output has exactly one entry per role.
    pub fn resolve(
        &self,
        roles: &[AccountRole],
        table: &RoleBindingTable,
    ) -> Result<Vec<ResolvedAccount>, IxError> {
        roles.iter().map(|role| self.resolve_one(role, table)).collect()
    }

    fn resolve_one(
        &self,
        role: &AccountRole,
        table: &RoleBindingTable,
    ) -> Result<ResolvedAccount, IxError> {
        let Some(binding) = table.lookup(&role.name) else {
            // Roles with an address fixed by the descriptor need no binding.
            if let Some(address) = role.address {
                return Ok(ResolvedAccount::new(&role.name, address, role.signer, role.writable));
            }
            return Err(IxError::MissingAccountBinding {
                role: role.name.clone(),
            });
        };

        let is_signer = match binding.signer {
            Some(false) if role.signer => {
                return Err(IxError::SignerRequirementViolation {
                    role: role.name.clone(),
                })
            }
            Some(signer) => signer,
            None => role.signer,
        };
        let is_writable = binding.writable.unwrap_or(role.writable);

        let address = match &binding.target {
            BindingTarget::Literal(address) => *address,
            BindingTarget::Derived { program_id, seeds } => {
                // Nobody holds a key for a derived address.
                if is_signer {
                    return Err(IxError::SignerRequirementViolation {
                        role: role.name.clone(),
                    });
                }
                self.deriver.derive(program_id, seeds.as_slice())?.0
            }
        };

        if let Some(fixed) = role.address {
            if fixed != address {
                return Err(IxError::ConflictingBinding {
                    name: role.name.clone(),
                    existing: fixed.to_string(),
                    new: address.to_string(),
                });
            }
        }

        debug!(
            role = %role.name,
            %address,
            signer = is_signer,
            writable = is_writable,
            "resolved account"
        );

        Ok(ResolvedAccount::new(&role.name, address, is_signer, is_writable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SYSTEM_PROGRAM_ID;

    fn program() -> Address {
        "6crPEdUww61S2GifdDKHWkFiZXw1EdFu8zR6XBXFjKL3".parse().unwrap()
    }

    fn roles() -> Vec<AccountRole> {
        vec![
            AccountRole::new("buyer", true, true),
            AccountRole::new("config", false, true),
            AccountRole::new("token_vault_account", false, true),
            AccountRole::new("system_program", false, false).with_address(SYSTEM_PROGRAM_ID),
        ]
    }

    fn table() -> RoleBindingTable {
        RoleBindingTable::new()
            .with("buyer", Binding::signer(Address::new([1; 32])))
            .unwrap()
            .with("config", Binding::derived(program(), &[b"config"]))
            .unwrap()
            .with("tokenVaultAccount", Binding::address(Address::new([3; 32])))
            .unwrap()
    }

    // -- Name handling ------------------------------------------------------

    #[test]
    fn normalization_collapses_spellings() {
        assert_eq!(normalize_role_name("token_vault_account"), "tokenvaultaccount");
        assert_eq!(normalize_role_name("tokenVaultAccount"), "tokenvaultaccount");
        assert_eq!(normalize_role_name("Token-Vault-Account"), "tokenvaultaccount");
    }

    #[test]
    fn camel_case_transform() {
        assert_eq!(to_camel_case("token_vault_account"), "tokenVaultAccount");
        assert_eq!(to_camel_case("mint"), "mint");
        assert_eq!(to_camel_case("_leading"), "leading");
    }

    // -- Resolution ---------------------------------------------------------

    #[test]
    fn resolves_in_role_order() {
        let resolver = AccountResolver::default();
        let accounts = resolver.resolve(&roles(), &table()).unwrap();

        let names: Vec<&str> = accounts.iter().map(|a| a.role.as_str()).collect();
        assert_eq!(names, ["buyer", "config", "token_vault_account", "system_program"]);

        assert_eq!(accounts[0].address, Address::new([1; 32]));
        assert!(accounts[0].is_signer && accounts[0].is_writable);
        assert_eq!(
            accounts[1].address.to_string(),
            "HTBE4SWc2tr1uFX8JdZNRoNB6RCzgXySz3KyDj5Z3hmB"
        );
        assert_eq!(accounts[2].address, Address::new([3; 32]));
        assert_eq!(accounts[3].address, SYSTEM_PROGRAM_ID);
        assert!(!accounts[3].is_writable);
    }

    #[test]
    fn removed_role_is_named_in_error() {
        let mut table = table();
        assert!(table.remove("token_vault_account").is_some());

        let err = AccountResolver::default().resolve(&roles(), &table).unwrap_err();
        match err {
            IxError::MissingAccountBinding { role } => assert_eq!(role, "token_vault_account"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn derived_binding_uses_shared_cache() {
        let deriver = AddressDeriver::new();
        let resolver = AccountResolver::new(deriver.clone());
        resolver.resolve(&roles(), &table()).unwrap();
        resolver.resolve(&roles(), &table()).unwrap();
        assert_eq!(deriver.cached(), 1);
    }

    // -- Overrides ----------------------------------------------------------

    #[test]
    fn writable_override_is_taken_verbatim() {
        let table = table()
            .with("system_program", Binding::address(SYSTEM_PROGRAM_ID).with_writable(true))
            .unwrap();
        let accounts = AccountResolver::default().resolve(&roles(), &table).unwrap();
        assert!(accounts[3].is_writable);

        let mut table = table;
        table.remove("config");
        table
            .bind("config", Binding::derived(program(), &[b"config"]).with_writable(false))
            .unwrap();
        let accounts = AccountResolver::default().resolve(&roles(), &table).unwrap();
        assert!(!accounts[1].is_writable);
    }

    #[test]
    fn signer_override_can_widen() {
        let mut table = table();
        table.remove("tokenVaultAccount");
        table
            .bind("token_vault_account", Binding::signer(Address::new([3; 32])))
            .unwrap();
        let accounts = AccountResolver::default().resolve(&roles(), &table).unwrap();
        assert!(accounts[2].is_signer);
    }

    #[test]
    fn signer_override_cannot_narrow() {
        let mut table = table();
        table.remove("buyer");
        table
            .bind("buyer", Binding::address(Address::new([1; 32])).with_signer(false))
            .unwrap();
        let err = AccountResolver::default().resolve(&roles(), &table).unwrap_err();
        assert!(matches!(err, IxError::SignerRequirementViolation { role } if role == "buyer"));
    }

    #[test]
    fn derived_binding_on_signer_role_rejected() {
        let mut table = table();
        table.remove("buyer");
        table.bind("buyer", Binding::derived(program(), &[b"buyer"])).unwrap();
        let err = AccountResolver::default().resolve(&roles(), &table).unwrap_err();
        assert!(matches!(err, IxError::SignerRequirementViolation { .. }));
    }

    // -- Conflicts ----------------------------------------------------------

    #[test]
    fn same_target_under_two_spellings_is_fine() {
        let mut table = table();
        table
            .bind("token_vault_account", Binding::address(Address::new([3; 32])))
            .unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn different_targets_under_two_spellings_conflict() {
        let mut table = table();
        let err = table
            .bind("token_vault_account", Binding::address(Address::new([4; 32])))
            .unwrap_err();
        match err {
            IxError::ConflictingBinding { name, existing, .. } => {
                assert_eq!(name, "token_vault_account");
                assert!(existing.starts_with("tokenVaultAccount = "));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn binding_against_fixed_address_must_agree() {
        let table = table()
            .with("system_program", Binding::address(Address::new([9; 32])))
            .unwrap();
        let err = AccountResolver::default().resolve(&roles(), &table).unwrap_err();
        assert!(matches!(err, IxError::ConflictingBinding { .. }));
    }
}

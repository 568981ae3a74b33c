//! Guarded, idempotent state changes against the live ledger.
//!
//! Every authority-changing step follows the same shape: read the current
//! state, skip if it already satisfies the target, refuse if the observed
//! state is not ours to change, otherwise submit and re-read until the target
//! holds. The skip test and the convergence test are the same predicate.

use std::fmt::{self, Debug};
use std::time::{SystemTime, UNIX_EPOCH};

use ledger_ix::{
    Address, Commitment, ConvergencePredicate, IxError, LedgerClient, PollPolicy, Signature,
    TxSigner,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::metadata::{
    create_metadata_instruction, lock_metadata_instruction, metadata_address, MetadataFields,
    MetadataState, TOKEN_METADATA_PROGRAM_ID,
};
use crate::operations::{FairTokenProgram, SaleAccounts};
use crate::program::{sale_end_window, ProgramAddresses, DECIMALS};
use crate::spl_token::{
    associated_token_address, create_associated_token_account_idempotent,
    create_mint_instructions, TOKEN_PROGRAM_ID,
};
use crate::state::{ConfigState, MintState, TokenAccountState};

// ---------------------------------------------------------------------------
// Guarded mutation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    Initial,
    AlreadySatisfied,
    Refused,
    Submitted,
    Confirmed,
    TimedOut,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationPhase::Initial => "initial",
            MutationPhase::AlreadySatisfied => "already_satisfied",
            MutationPhase::Refused => "refused",
            MutationPhase::Submitted => "submitted",
            MutationPhase::Confirmed => "confirmed",
            MutationPhase::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// How a guarded mutation finished successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome<S> {
    /// Target already held; nothing was submitted.
    AlreadySatisfied { state: S },
    /// Submitted, and a later read showed the target.
    Confirmed { signature: Signature, state: S },
}

impl<S> MutationOutcome<S> {
    pub fn phase(&self) -> MutationPhase {
        match self {
            MutationOutcome::AlreadySatisfied { .. } => MutationPhase::AlreadySatisfied,
            MutationOutcome::Confirmed { .. } => MutationPhase::Confirmed,
        }
    }

    pub fn state(&self) -> &S {
        match self {
            MutationOutcome::AlreadySatisfied { state }
            | MutationOutcome::Confirmed { state, .. } => state,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            MutationOutcome::AlreadySatisfied { .. } => None,
            MutationOutcome::Confirmed { signature, .. } => Some(signature),
        }
    }

    pub fn into_state(self) -> S {
        match self {
            MutationOutcome::AlreadySatisfied { state }
            | MutationOutcome::Confirmed { state, .. } => state,
        }
    }
}

type ReadFn<'a, S> = Box<dyn Fn() -> Result<Option<S>, IxError> + 'a>;
type TargetFn<'a, S> = Box<dyn Fn(&S) -> bool + 'a>;

/// Read, skip-or-refuse, submit, then poll until `target` holds.
pub struct GuardedMutation<'a, S> {
    label: String,
    read: ReadFn<'a, S>,
    target: TargetFn<'a, S>,
    policy: PollPolicy,
}

impl<'a, S: Debug> GuardedMutation<'a, S> {
    pub fn new<R, T>(label: impl Into<String>, read: R, target: T) -> Self
    where
        R: Fn() -> Result<Option<S>, IxError> + 'a,
        T: Fn(&S) -> bool + 'a,
    {
        Self {
            label: label.into(),
            read: Box::new(read),
            target: Box::new(target),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `precondition` sees the observed state (`None` if absent) only when
    /// the target does not already hold; an `Err` from it aborts before
    /// anything is submitted. `mutate` runs at most once.
    pub fn run<P, M>(self, precondition: P, mutate: M) -> Result<MutationOutcome<S>, IxError>
    where
        P: FnOnce(Option<&S>) -> Result<(), IxError>,
        M: FnOnce() -> Result<Signature, IxError>,
    {
        let label = self.label;
        debug!(label = %label, phase = %MutationPhase::Initial, "reading current state");

        match (self.read)()? {
            Some(state) if (self.target)(&state) => {
                info!(label = %label, phase = %MutationPhase::AlreadySatisfied, "nothing to do");
                return Ok(MutationOutcome::AlreadySatisfied { state });
            }
            observed => {
                if let Err(err) = precondition(observed.as_ref()) {
                    warn!(
                        label = %label,
                        phase = %MutationPhase::Refused,
                        error = %err,
                        "refusing to submit"
                    );
                    return Err(err);
                }
            }
        }

        let signature = mutate()?;
        info!(
            label = %label,
            phase = %MutationPhase::Submitted,
            signature = %signature,
            "submitted"
        );

        let read = &self.read;
        let target = &self.target;
        let polled = ConvergencePredicate::new(label.clone(), || read(), |s: &S| target(s))
            .with_policy(self.policy)
            .poll();

        match polled {
            Ok(state) => {
                info!(
                    label = %label,
                    phase = %MutationPhase::Confirmed,
                    signature = %signature,
                    "converged"
                );
                Ok(MutationOutcome::Confirmed { signature, state })
            }
            Err(err) => {
                if err.is_retryable_later() {
                    warn!(
                        label = %label,
                        phase = %MutationPhase::TimedOut,
                        signature = %signature,
                        "submitted but not yet visible; re-run to re-check"
                    );
                }
                Err(err)
            }
        }
    }
}

fn refuse(reason: impl Into<String>, observed: impl Into<String>) -> IxError {
    IxError::PreconditionRefused {
        reason: reason.into(),
        observed: observed.into(),
    }
}

fn fmt_authority(authority: Option<Address>) -> String {
    authority.map_or_else(|| "none".to_string(), |a| a.to_string())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sale workflows
// ---------------------------------------------------------------------------

/// Observed state the sale initialization targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleState {
    pub mint: MintState,
    pub config: Option<ConfigState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletPosition {
    pub wallet: Address,
    pub token_account: Address,
    /// `None` when the associated account does not exist yet.
    pub tokens: Option<u64>,
}

/// Snapshot of the sale for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleReport {
    pub addresses: ProgramAddresses,
    pub config: Option<ConfigState>,
    pub mint: Option<MintState>,
    pub sol_vault_lamports: u64,
    pub vault_tokens: Option<u64>,
    pub wallet: Option<WalletPosition>,
}

/// The program's operator workflows, bound to one ledger.
pub struct SaleWorkflow<'a, L: ?Sized> {
    ledger: &'a L,
    program: &'a FairTokenProgram,
    commitment: Commitment,
    policy: PollPolicy,
    clock: fn() -> i64,
}

impl<'a, L: LedgerClient + ?Sized> SaleWorkflow<'a, L> {
    pub fn new(ledger: &'a L, program: &'a FairTokenProgram) -> Self {
        Self {
            ledger,
            program,
            commitment: Commitment::default(),
            policy: PollPolicy::default(),
            clock: unix_now,
        }
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Unix-seconds source for the sale window check.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn program(&self) -> &FairTokenProgram {
        self.program
    }

    // -- reads --------------------------------------------------------------

    fn read_owned<T>(
        &self,
        address: &Address,
        owner: &Address,
        decode: fn(&[u8]) -> Result<T, IxError>,
    ) -> Result<Option<T>, IxError> {
        let Some(account) = self.ledger.read_account(address, self.commitment)? else {
            return Ok(None);
        };
        if account.owner != *owner {
            return Err(IxError::InvalidAccountData(format!(
                "{address} is owned by {}, expected {owner}",
                account.owner
            )));
        }
        decode(&account.data).map(Some)
    }

    pub fn read_mint(&self, mint: &Address) -> Result<Option<MintState>, IxError> {
        self.read_owned(mint, &TOKEN_PROGRAM_ID, MintState::unpack)
    }

    pub fn read_metadata(&self, mint: &Address) -> Result<Option<MetadataState>, IxError> {
        let metadata = metadata_address(self.program.deriver(), mint)?;
        self.read_owned(&metadata, &TOKEN_METADATA_PROGRAM_ID, MetadataState::unpack)
    }

    pub fn read_config(&self) -> Result<Option<ConfigState>, IxError> {
        let config = self.program.addresses().config;
        self.read_owned(&config, &self.program.program_id(), ConfigState::unpack)
    }

    pub fn read_token_account(
        &self,
        address: &Address,
    ) -> Result<Option<TokenAccountState>, IxError> {
        self.read_owned(address, &TOKEN_PROGRAM_ID, TokenAccountState::unpack)
    }

    /// Mint and token vault account as recorded by `initialize`.
    pub fn sale_accounts(&self) -> Result<SaleAccounts, IxError> {
        match self.read_config()? {
            Some(config) if config.initialized => Ok(SaleAccounts {
                mint: config.mint,
                token_vault_account: config.token_vault_account,
            }),
            _ => Err(refuse(
                "sale is not initialized",
                format!("config {}", self.program.addresses().config),
            )),
        }
    }

    // -- metadata -----------------------------------------------------------

    /// Create the mint's metadata with `fields`, `authority` paying and
    /// keeping update authority. Refuses unless `authority` is the mint
    /// authority, or if metadata already exists with other fields.
    pub fn ensure_metadata(
        &self,
        mint: &Address,
        authority: &dyn TxSigner,
        fields: &MetadataFields,
    ) -> Result<MutationOutcome<MetadataState>, IxError> {
        let metadata = metadata_address(self.program.deriver(), mint)?;
        let signer = authority.pubkey();

        GuardedMutation::new(
            format!("metadata {metadata}"),
            || self.read_metadata(mint),
            |md: &MetadataState| md.mint == *mint && md.has_fields(fields),
        )
        .with_policy(self.policy)
        .run(
            |observed| {
                if let Some(md) = observed {
                    return Err(refuse(
                        "metadata exists with different fields",
                        format!("{} / {} / {}", md.name, md.symbol, md.uri),
                    ));
                }
                let Some(mint_state) = self.read_mint(mint)? else {
                    return Err(refuse("mint does not exist", mint.to_string()));
                };
                if mint_state.mint_authority != Some(signer) {
                    return Err(refuse(
                        format!("mint authority is not {signer}"),
                        fmt_authority(mint_state.mint_authority),
                    ));
                }
                Ok(())
            },
            || {
                let ix = create_metadata_instruction(
                    &metadata, mint, &signer, &signer, &signer, fields,
                )?;
                self.ledger.submit(&[ix], &[authority], self.commitment)
            },
        )
    }

    /// Make the mint's metadata immutable. Refuses unless `authority` is the
    /// current update authority.
    pub fn ensure_metadata_locked(
        &self,
        mint: &Address,
        authority: &dyn TxSigner,
    ) -> Result<MutationOutcome<MetadataState>, IxError> {
        let metadata = metadata_address(self.program.deriver(), mint)?;
        let signer = authority.pubkey();

        GuardedMutation::new(
            format!("metadata lock {metadata}"),
            || self.read_metadata(mint),
            MetadataState::is_locked,
        )
        .with_policy(self.policy)
        .run(
            |observed| match observed {
                None => Err(refuse("metadata account does not exist", metadata.to_string())),
                Some(md) if md.authority() != Some(signer) => Err(refuse(
                    format!("update authority is not {signer}"),
                    fmt_authority(md.authority()),
                )),
                Some(_) => Ok(()),
            },
            || {
                let ix = lock_metadata_instruction(&metadata, &signer);
                self.ledger.submit(&[ix], &[authority], self.commitment)
            },
        )
    }

    // -- mint creation ------------------------------------------------------

    /// Create `mint` with `admin` as mint authority and no freeze authority.
    /// Refuses if the address already holds anything else.
    pub fn ensure_mint(
        &self,
        mint: &dyn TxSigner,
        admin: &dyn TxSigner,
        decimals: u8,
    ) -> Result<MutationOutcome<MintState>, IxError> {
        let mint_address = mint.pubkey();
        let admin_address = admin.pubkey();

        let read = || -> Result<Option<MintState>, IxError> {
            match self.ledger.read_account(&mint_address, self.commitment)? {
                None => Ok(None),
                Some(account) if account.owner == TOKEN_PROGRAM_ID => {
                    MintState::unpack(&account.data).map(Some)
                }
                Some(account) => Err(refuse(
                    "mint address holds a non-token account",
                    format!("owner {}", account.owner),
                )),
            }
        };
        let target = move |s: &MintState| {
            s.is_initialized
                && s.decimals == decimals
                && s.mint_authority == Some(admin_address)
                && s.freeze_authority.is_none()
        };

        GuardedMutation::new(format!("mint {mint_address}"), read, target)
            .with_policy(self.policy)
            .run(
                |observed| match observed {
                    None => Ok(()),
                    Some(existing) => Err(refuse(
                        "mint exists with a different configuration",
                        format!("{existing:?}"),
                    )),
                },
                || {
                    let rent = self.ledger.minimum_balance_for_rent_exemption(MintState::LEN)?;
                    let ixs = create_mint_instructions(
                        &admin_address,
                        &mint_address,
                        rent,
                        decimals,
                        &admin_address,
                    );
                    self.ledger.submit(&ixs, &[admin, mint], self.commitment)
                },
            )
    }

    // -- sale initialization ------------------------------------------------

    /// Hand mint authority to the program and record the sale config.
    ///
    /// Refuses unless `admin` is the current mint authority (and the
    /// deployment's gated admin, if any) and the mint has the program's
    /// decimals, no freeze authority and zero supply.
    pub fn initialize_sale(
        &self,
        admin: &dyn TxSigner,
        mint: &Address,
        token_vault_account: &dyn TxSigner,
        sale_end: i64,
    ) -> Result<MutationOutcome<SaleState>, IxError> {
        let admin_address = admin.pubkey();
        let pda_authority = self.program.addresses().mint_authority;

        let read = || -> Result<Option<SaleState>, IxError> {
            let Some(mint_state) = self.read_mint(mint)? else {
                return Ok(None);
            };
            Ok(Some(SaleState {
                mint: mint_state,
                config: self.read_config()?,
            }))
        };
        let target = |s: &SaleState| {
            s.config.as_ref().is_some_and(|c| c.initialized && c.mint == *mint)
                && s.mint.mint_authority == Some(pda_authority)
        };
        let now = (self.clock)();

        GuardedMutation::new(format!("sale initialization {mint}"), read, target)
            .with_policy(self.policy)
            .run(
                |observed| {
                    let Some(state) = observed else {
                        return Err(refuse("mint does not exist", mint.to_string()));
                    };
                    if let Some(config) = state.config.as_ref().filter(|c| c.initialized) {
                        return Err(refuse(
                            "sale is already initialized",
                            format!("config mint {}", config.mint),
                        ));
                    }
                    let m = &state.mint;
                    if m.mint_authority != Some(admin_address) {
                        return Err(refuse(
                            format!("mint authority is not {admin_address}"),
                            fmt_authority(m.mint_authority),
                        ));
                    }
                    if let Some(gate) = self.program.admin().filter(|g| *g != admin_address) {
                        return Err(refuse(
                            format!("initialize is restricted to {gate}"),
                            admin_address.to_string(),
                        ));
                    }
                    if m.decimals != DECIMALS {
                        return Err(refuse(
                            format!("mint must have {DECIMALS} decimals"),
                            m.decimals.to_string(),
                        ));
                    }
                    if m.freeze_authority.is_some() {
                        return Err(refuse(
                            "freeze authority must be revoked",
                            fmt_authority(m.freeze_authority),
                        ));
                    }
                    if m.supply != 0 {
                        return Err(refuse("mint supply must be zero", m.supply.to_string()));
                    }
                    let (earliest, latest) = sale_end_window(now);
                    if !(earliest..=latest).contains(&sale_end) {
                        return Err(refuse(
                            format!("sale end must be between {earliest} and {latest}"),
                            sale_end.to_string(),
                        ));
                    }
                    Ok(())
                },
                || {
                    let ix = self.program.initialize(
                        &admin_address,
                        mint,
                        &token_vault_account.pubkey(),
                        sale_end,
                    )?;
                    self.ledger.submit(&[ix], &[admin, token_vault_account], self.commitment)
                },
            )
    }

    // -- buy / redeem -------------------------------------------------------

    /// Pay `lamports` for the same number of base units. Creates the buyer's
    /// associated token account if needed.
    pub fn buy(&self, buyer: &dyn TxSigner, lamports: u64) -> Result<Signature, IxError> {
        let sale = self.sale_accounts()?;
        let buyer_address = buyer.pubkey();
        let ata = associated_token_address(self.program.deriver(), &buyer_address, &sale.mint)?;

        let ixs = [
            create_associated_token_account_idempotent(
                &buyer_address,
                &ata,
                &buyer_address,
                &sale.mint,
            ),
            self.program.buy(&buyer_address, &sale, lamports)?,
        ];
        let signature = self.ledger.submit(&ixs, &[buyer], self.commitment)?;
        info!(buyer = %buyer_address, lamports, signature = %signature, "bought");
        Ok(signature)
    }

    /// Return `amount` base units for the same number of lamports.
    pub fn redeem(&self, redeemer: &dyn TxSigner, amount: u64) -> Result<Signature, IxError> {
        let sale = self.sale_accounts()?;
        let redeemer_address = redeemer.pubkey();

        let ix = self.program.redeem(&redeemer_address, &sale, amount)?;
        let signature = self.ledger.submit(&[ix], &[redeemer], self.commitment)?;
        info!(redeemer = %redeemer_address, amount, signature = %signature, "redeemed");
        Ok(signature)
    }

    // -- report -------------------------------------------------------------

    pub fn sale_report(&self, wallet: Option<&Address>) -> Result<SaleReport, IxError> {
        let addresses = *self.program.addresses();
        let config = self.read_config()?;

        let sol_vault_lamports = self
            .ledger
            .read_account(&addresses.sol_vault, self.commitment)?
            .map_or(0, |a| a.lamports);

        let (mint, vault_tokens, wallet) = match &config {
            Some(c) => {
                let mint = self.read_mint(&c.mint)?;
                let vault_tokens = self
                    .read_token_account(&c.token_vault_account)?
                    .map(|t| t.amount);
                let wallet = match wallet {
                    Some(w) => {
                        let token_account =
                            associated_token_address(self.program.deriver(), w, &c.mint)?;
                        Some(WalletPosition {
                            wallet: *w,
                            token_account,
                            tokens: self.read_token_account(&token_account)?.map(|t| t.amount),
                        })
                    }
                    None => None,
                };
                (mint, vault_tokens, wallet)
            }
            None => (None, None, None),
        };

        Ok(SaleReport {
            addresses,
            config,
            mint,
            sol_vault_lamports,
            vault_tokens,
            wallet,
        })
    }
}

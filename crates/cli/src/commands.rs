//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use fair_token::{
    associated_token_address, metadata_address, FairTokenProgram, MetadataFields, ProgramError,
    SaleWorkflow,
};
use ledger_ix::{
    account_discriminator, decode_arg, derive_selector, Address, AddressDeriver, Binding,
    Commitment, IxError, Keypair, PollPolicy, ProgramSchema, TxSigner,
};
use ledger_rpc::{RpcConfig, RpcLedgerClient};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::keyfile::{default_wallet_path, load_or_create, read_keypair_file};
use crate::output::{self, emit};

/// Settings shared by every subcommand.
pub struct Session {
    pub rpc_url: String,
    pub commitment: Commitment,
    pub wallet: Option<PathBuf>,
    pub program_id: Option<Address>,
    pub idl: Option<PathBuf>,
    pub poll: PollPolicy,
    pub json: bool,
}

impl Session {
    pub fn program(&self) -> Result<FairTokenProgram> {
        let Some(path) = &self.idl else {
            return FairTokenProgram::embedded(self.program_id)
                .context("failed to load embedded IDL");
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read IDL {}", path.display()))?;
        let schema = ProgramSchema::from_idl_json(&text)
            .with_context(|| format!("invalid IDL {}", path.display()))?;
        let program_id = self
            .program_id
            .or(schema.program_id())
            .ok_or_else(|| anyhow!("IDL declares no address; pass --program-id"))?;
        Ok(FairTokenProgram::new(program_id, Arc::new(schema), AddressDeriver::new())?)
    }

    pub fn ledger(&self) -> Result<RpcLedgerClient> {
        let config = RpcConfig::new(&self.rpc_url)
            .with_commitment(self.commitment)
            .with_confirm_policy(self.poll);
        RpcLedgerClient::new(config).context("failed to build RPC client")
    }

    pub fn wallet(&self) -> Result<Keypair> {
        let path = self
            .wallet
            .clone()
            .or_else(default_wallet_path)
            .ok_or_else(|| anyhow!("no wallet; pass --wallet or set ANCHOR_WALLET"))?;
        let keypair = read_keypair_file(&path)?;
        info!(wallet = %keypair.pubkey(), path = %path.display(), "loaded wallet");
        Ok(keypair)
    }
}

/// Attach the decoded program error, when there is one.
pub fn ledger_error(err: IxError) -> anyhow::Error {
    match ProgramError::from_failure(&err) {
        Some(program_error) => anyhow::Error::new(err)
            .context(format!("program error {}: {program_error}", program_error.code())),
        None => err.into(),
    }
}

fn workflow<'a>(
    ctx: &Session,
    ledger: &'a RpcLedgerClient,
    program: &'a FairTokenProgram,
) -> SaleWorkflow<'a, RpcLedgerClient> {
    SaleWorkflow::new(ledger, program)
        .with_commitment(ctx.commitment)
        .with_policy(ctx.poll)
}

// -- offline ----------------------------------------------------------------

pub fn selector(ctx: &Session, name: &str, account: bool) -> Result<()> {
    let bytes = if account {
        account_discriminator(name)
    } else {
        derive_selector(name)?
    };
    let value = json!({ "name": name, "selector": hex::encode(bytes) });
    emit(ctx.json, &value, |_| hex::encode(bytes))
}

#[derive(Serialize)]
struct PdaReport {
    #[serde(flatten)]
    program: fair_token::ProgramAddresses,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_account: Option<Address>,
}

pub fn pda(ctx: &Session, mint: Option<Address>, owner: Option<Address>) -> Result<()> {
    let program = ctx.program()?;
    let deriver = program.deriver();
    let metadata = mint.map(|m| metadata_address(deriver, &m)).transpose()?;
    let token_account = match (owner, mint) {
        (Some(owner), Some(mint)) => Some(associated_token_address(deriver, &owner, &mint)?),
        (Some(_), None) => bail!("--owner needs --mint"),
        _ => None,
    };
    let report = PdaReport {
        program: *program.addresses(),
        metadata,
        token_account,
    };
    emit(ctx.json, &report, |r| {
        let a = &r.program;
        let mut lines = vec![
            format!("program:        {}", a.program_id),
            format!("config:         {}", a.config),
            format!("mint authority: {}", a.mint_authority),
            format!("sol vault:      {}", a.sol_vault),
            format!("token vault:    {}", a.token_vault),
        ];
        if let Some(md) = r.metadata {
            lines.push(format!("metadata:       {md}"));
        }
        if let Some(ata) = r.token_account {
            lines.push(format!("token account:  {ata}"));
        }
        lines.join("\n")
    })
}

/// `role=ADDRESS[:signer][:writable]`
pub fn parse_binding(spec: &str) -> Result<(String, Binding)> {
    let (role, rest) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("binding {spec:?} is not role=address"))?;
    let mut parts = rest.split(':');
    let address: Address = parts
        .next()
        .unwrap_or_default()
        .parse()
        .with_context(|| format!("binding {role:?} has an invalid address"))?;
    let mut binding = Binding::address(address);
    for flag in parts {
        binding = match flag {
            "signer" => binding.with_signer(true),
            "writable" => binding.with_writable(true),
            "readonly" => binding.with_writable(false),
            other => bail!("unknown binding flag {other:?} for {role:?}"),
        };
    }
    Ok((role.to_string(), binding))
}

/// Build an instruction from the IDL without sending it. Program PDAs are
/// pre-bound; `bindings` may override them.
pub fn resolve(ctx: &Session, operation: &str, bindings: &[String], args: &[i128]) -> Result<()> {
    let program = ctx.program()?;
    let mut table = program.base_bindings()?;
    for spec in bindings {
        let (role, binding) = parse_binding(spec)?;
        table.remove(&role);
        table.bind(role, binding)?;
    }
    let ix = program
        .builder()
        .build(operation, &table, args)
        .with_context(|| format!("failed to build {operation}"))?;
    emit(ctx.json, &ix, output::instruction_text)
}

#[derive(Debug, Serialize)]
pub struct DecodedArg {
    pub name: String,
    pub value: i128,
}

/// Decode instruction data (selector ‖ args) for `operation`.
pub fn decode_instruction_data(
    program: &FairTokenProgram,
    operation: &str,
    data: &[u8],
) -> Result<Vec<DecodedArg>> {
    let descriptor = program.builder().schema().operation(operation)?;
    let (selector, mut rest) = data
        .split_at_checked(descriptor.selector.len())
        .ok_or_else(|| anyhow!("data is shorter than a selector"))?;
    if selector != descriptor.selector.as_slice() {
        bail!(
            "selector {} is not {operation} ({})",
            hex::encode(selector),
            hex::encode(descriptor.selector)
        );
    }

    let mut args = Vec::with_capacity(descriptor.args.len());
    for spec in &descriptor.args {
        let (value, used) = decode_arg(spec, rest)?;
        rest = &rest[used..];
        args.push(DecodedArg { name: spec.name.clone(), value });
    }
    if !rest.is_empty() {
        bail!("{} trailing bytes after arguments", rest.len());
    }
    Ok(args)
}

pub fn inspect(ctx: &Session, operation: &str, data_hex: &str) -> Result<()> {
    let program = ctx.program()?;
    let data = hex::decode(data_hex.trim_start_matches("0x")).context("data is not hex")?;
    let args = decode_instruction_data(&program, operation, &data)?;
    emit(ctx.json, &args, |args| {
        args.iter()
            .map(|a| format!("{}: {}", a.name, a.value))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

// -- reads ------------------------------------------------------------------

pub fn view_metadata(ctx: &Session, mint: &Address) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let metadata = workflow(ctx, &ledger, &program)
        .read_metadata(mint)
        .map_err(ledger_error)?
        .ok_or_else(|| anyhow!("mint {mint} has no metadata account"))?;
    emit(ctx.json, &metadata, output::metadata_text)
}

pub fn report(ctx: &Session, owner: Option<Address>) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let report = workflow(ctx, &ledger, &program)
        .sale_report(owner.as_ref())
        .map_err(ledger_error)?;
    emit(ctx.json, &report, output::report_text)
}

// -- mutations --------------------------------------------------------------

pub fn create_metadata(ctx: &Session, mint: &Address, fields: &MetadataFields) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let authority = ctx.wallet()?;
    let outcome = workflow(ctx, &ledger, &program)
        .ensure_metadata(mint, &authority, fields)
        .map_err(ledger_error)?;
    emit(ctx.json, &outcome, |o| {
        format!(
            "{}
{}",
            output::outcome_text("create metadata", o),
            output::metadata_text(o.state())
        )
    })
}

pub fn lock(ctx: &Session, mint: &Address) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let authority = ctx.wallet()?;
    let outcome = workflow(ctx, &ledger, &program)
        .ensure_metadata_locked(mint, &authority)
        .map_err(ledger_error)?;
    emit(ctx.json, &outcome, |o| output::outcome_text("lock metadata", o))
}

pub fn create_mint(ctx: &Session, mint_keypair: &Path, decimals: u8) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let admin = ctx.wallet()?;
    let (mint, created) = load_or_create(mint_keypair)?;
    if created {
        info!(mint = %mint.pubkey(), path = %mint_keypair.display(), "generated mint keypair");
    }
    let outcome = workflow(ctx, &ledger, &program)
        .ensure_mint(&mint, &admin, decimals)
        .map_err(ledger_error)?;
    emit(ctx.json, &outcome, |o| {
        format!("{}\nmint: {}", output::outcome_text("create mint", o), mint.pubkey())
    })
}

/// Unix seconds `days` from now.
pub fn sale_end_in_days(now: i64, days: u32) -> i64 {
    now + i64::from(days) * 86_400
}

pub fn initialize(ctx: &Session, mint: &Address, sale_end: i64) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let admin = ctx.wallet()?;
    // The program creates the vault token account; it only needs to sign once.
    let token_vault_account = Keypair::generate();
    let outcome = workflow(ctx, &ledger, &program)
        .initialize_sale(&admin, mint, &token_vault_account, sale_end)
        .map_err(ledger_error)?;
    emit(ctx.json, &outcome, |o| output::outcome_text("initialize sale", o))
}

pub fn buy(ctx: &Session, lamports: u64) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let buyer = ctx.wallet()?;
    let signature = workflow(ctx, &ledger, &program)
        .buy(&buyer, lamports)
        .map_err(ledger_error)?;
    let value = json!({ "signature": signature, "lamports": lamports });
    emit(ctx.json, &value, |_| {
        format!("bought {} tokens ({signature})", output::format_tokens(lamports))
    })
}

pub fn redeem(ctx: &Session, amount: u64) -> Result<()> {
    let program = ctx.program()?;
    let ledger = ctx.ledger()?;
    let redeemer = ctx.wallet()?;
    let signature = workflow(ctx, &ledger, &program)
        .redeem(&redeemer, amount)
        .map_err(ledger_error)?;
    let value = json!({ "signature": signature, "amount": amount });
    emit(ctx.json, &value, |_| {
        format!("redeemed {} tokens ({signature})", output::format_tokens(amount))
    })
}

pub fn poll_policy(attempts: u32, delay_ms: u64) -> PollPolicy {
    PollPolicy::new(attempts, Duration::from_millis(delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_ix::BindingTarget;

    fn offline() -> Session {
        Session {
            rpc_url: ledger_rpc::DEVNET_URL.to_string(),
            commitment: Commitment::Confirmed,
            wallet: None,
            program_id: None,
            idl: None,
            poll: PollPolicy::default(),
            json: true,
        }
    }

    // -- bindings -----------------------------------------------------------

    #[test]
    fn binding_with_flags() {
        let addr = Address::new([4; 32]);
        let (role, binding) = parse_binding(&format!("buyer={addr}:signer:writable")).unwrap();
        assert_eq!(role, "buyer");
        assert_eq!(binding.target, BindingTarget::Literal(addr));
        assert_eq!(binding.signer, Some(true));
        assert_eq!(binding.writable, Some(true));
    }

    #[test]
    fn plain_binding_keeps_idl_flags() {
        let addr = Address::new([4; 32]);
        let (_, binding) = parse_binding(&format!("mint={addr}")).unwrap();
        assert_eq!(binding.signer, None);
        assert_eq!(binding.writable, None);
    }

    #[test]
    fn malformed_bindings() {
        assert!(parse_binding("buyer").is_err());
        assert!(parse_binding("buyer=not-an-address").is_err());
        let addr = Address::new([4; 32]);
        assert!(parse_binding(&format!("buyer={addr}:owner")).is_err());
    }

    // -- program loading ----------------------------------------------------

    #[test]
    fn program_id_override_applies() {
        let ctx = Session {
            program_id: Some(Address::new([3; 32])),
            ..offline()
        };
        assert_eq!(ctx.program().unwrap().program_id(), Address::new([3; 32]));
    }

    #[test]
    fn idl_file_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fair_token.json");
        std::fs::write(&path, fair_token::IDL_JSON).unwrap();

        let ctx = Session {
            idl: Some(path),
            ..offline()
        };
        assert_eq!(
            ctx.program().unwrap().program_id(),
            fair_token::FAIR_TOKEN_PROGRAM_ID
        );
    }

    #[test]
    fn missing_idl_file_names_path() {
        let ctx = Session {
            idl: Some(PathBuf::from("/nonexistent/fair_token.json")),
            ..offline()
        };
        let err = ctx.program().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fair_token.json"));
    }

    #[test]
    fn resolve_fails_on_missing_role() {
        let err = resolve(&offline(), "buy_fair_token", &[], &[1]).unwrap_err();
        assert!(format!("{err:#}").contains("missing account binding"));
    }

    // -- inspect ------------------------------------------------------------

    #[test]
    fn decodes_initialize_data() {
        let program = offline().program().unwrap();
        let mut data = hex::decode("afaf6d1f0d989bed").unwrap();
        data.extend_from_slice(&(-1i64).to_le_bytes());

        let args = decode_instruction_data(&program, "initialize", &data).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].name, "sale_end");
        assert_eq!(args[0].value, -1);
    }

    #[test]
    fn rejects_foreign_selector_and_trailing_bytes() {
        let program = offline().program().unwrap();
        let mut data = derive_selector("buy_fair_token").unwrap().to_vec();
        data.extend_from_slice(&5u64.to_le_bytes());

        assert!(decode_instruction_data(&program, "redeem_fair_token", &data).is_err());
        data.push(0);
        let err = decode_instruction_data(&program, "buy_fair_token", &data).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    // -- errors -------------------------------------------------------------

    #[test]
    fn program_errors_are_named() {
        let err = ledger_error(IxError::SubmissionFailure {
            message: "custom program error: 0x1770".into(),
            logs: vec![],
        });
        assert!(err.to_string().starts_with("program error 6000"));
        assert!(err.downcast_ref::<IxError>().is_some());
    }

    #[test]
    fn other_errors_pass_through() {
        let err = ledger_error(IxError::Transport("connection refused".into()));
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn sale_days() {
        assert_eq!(sale_end_in_days(1_000, 60), 1_000 + 60 * 86_400);
    }
}

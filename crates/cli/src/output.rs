//! Command results on stdout, as text or JSON. Logs go to stderr.

use std::fmt::Write as _;

use anyhow::Result;
use fair_token::{MetadataState, MutationOutcome, SaleReport, DECIMALS};
use ledger_ix::EncodedInstruction;
use serde::Serialize;

pub fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

/// Base units as a decimal token amount.
pub fn format_tokens(base_units: u64) -> String {
    let scale = 10u64.pow(u32::from(DECIMALS));
    let whole = base_units / scale;
    let frac = base_units % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = usize::from(DECIMALS));
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

pub fn outcome_text<S>(label: &str, outcome: &MutationOutcome<S>) -> String {
    match outcome.signature() {
        Some(sig) => format!("{label}: {} ({sig})", outcome.phase()),
        None => format!("{label}: {}", outcome.phase()),
    }
}

pub fn instruction_text(ix: &EncodedInstruction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "program: {}", ix.program_id);
    let _ = writeln!(out, "data:    {}", hex::encode(&ix.data));
    for (i, account) in ix.accounts.iter().enumerate() {
        let flags = match (account.is_signer, account.is_writable) {
            (true, true) => "signer, writable",
            (true, false) => "signer",
            (false, true) => "writable",
            (false, false) => "",
        };
        let _ = writeln!(out, "  {i:>2} {:<24} {} {flags}", account.role, account.address);
    }
    out.trim_end().to_string()
}

pub fn metadata_text(md: &MetadataState) -> String {
    let authority = md
        .authority()
        .map_or_else(|| "none".to_string(), |a| a.to_string());
    format!(
        "name:      {}\nsymbol:    {}\nuri:       {}\nmint:      {}\nmutable:   {}\nauthority: {authority}\nlocked:    {}",
        md.name,
        md.symbol,
        md.uri,
        md.mint,
        md.is_mutable,
        md.is_locked(),
    )
}

pub fn report_text(report: &SaleReport) -> String {
    let mut out = String::new();
    let a = &report.addresses;
    let _ = writeln!(out, "program:        {}", a.program_id);
    let _ = writeln!(out, "config:         {}", a.config);
    let _ = writeln!(out, "mint authority: {}", a.mint_authority);
    let _ = writeln!(out, "sol vault:      {} ({} lamports)", a.sol_vault, report.sol_vault_lamports);

    match &report.config {
        None => {
            let _ = writeln!(out, "sale:           not initialized");
        }
        Some(config) => {
            let _ = writeln!(out, "mint:           {}", config.mint);
            let _ = writeln!(out, "sale end:       {}", config.sale_end);
            let _ = writeln!(out, "finalized:      {}", config.finalized);
            let _ = writeln!(out, "burned:         {}", format_tokens(config.total_burned));
            let _ = writeln!(
                out,
                "min supply:     {}",
                format_tokens(config.min_supply_base_units)
            );
        }
    }
    if let Some(mint) = &report.mint {
        let _ = writeln!(out, "supply:         {}", format_tokens(mint.supply));
    }
    if let Some(tokens) = report.vault_tokens {
        let _ = writeln!(out, "vault tokens:   {}", format_tokens(tokens));
    }
    if let Some(wallet) = &report.wallet {
        let held = wallet
            .tokens
            .map_or_else(|| "no token account".to_string(), format_tokens);
        let _ = writeln!(out, "wallet:         {} holds {held}", wallet.wallet);
    }
    out.trim_end().to_string()
}

//! `fairmint`: operator CLI for the fair-token sale program.

mod commands;
mod keyfile;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fair_token::{MetadataFields, DECIMALS};
use ledger_ix::{Address, Commitment};
use ledger_rpc::DEVNET_URL;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::Session;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "fairmint", author, version, about, long_about = None)]
struct Cli {
    /// RPC endpoint
    #[arg(long, global = true, env = "ANCHOR_PROVIDER_URL", default_value = DEVNET_URL)]
    rpc_url: String,

    /// processed|confirmed|finalized
    #[arg(long, global = true, env = "FAIRMINT_COMMITMENT", default_value = "confirmed")]
    commitment: Commitment,

    /// Keypair file that pays and signs (default ~/.config/solana/id.json)
    #[arg(long, global = true, env = "ANCHOR_WALLET")]
    wallet: Option<PathBuf>,

    /// Deployed program address (default: the IDL's address)
    #[arg(long, global = true, env = "FAIRMINT_PROGRAM_ID")]
    program_id: Option<Address>,

    /// Load this IDL instead of the embedded one
    #[arg(long, global = true)]
    idl: Option<PathBuf>,

    /// Reads before giving up on a submitted change
    #[arg(long, global = true, default_value_t = 20)]
    poll_attempts: u32,

    /// Delay between those reads
    #[arg(long, global = true, default_value_t = 500)]
    poll_delay_ms: u64,

    /// JSON output and JSON logs
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the 8-byte selector for an operation name
    Selector {
        name: String,
        /// Account discriminator (`account:<Name>`) instead
        #[arg(long)]
        account: bool,
    },
    /// Print the program's derived addresses
    Pda {
        #[arg(long)]
        mint: Option<Address>,
        /// Also derive this wallet's token account for --mint
        #[arg(long)]
        owner: Option<Address>,
    },
    /// Build an instruction from the IDL and print it without sending
    Resolve {
        operation: String,
        /// role=ADDRESS[:signer][:writable|:readonly], repeatable
        #[arg(long = "bind", short = 'b')]
        bindings: Vec<String>,
        /// Integer arguments in declaration order
        #[arg(long = "arg", short = 'a', allow_negative_numbers = true)]
        args: Vec<i128>,
    },
    /// Decode instruction data against the IDL
    Inspect {
        operation: String,
        /// selector ‖ args, hex
        data: String,
    },
    /// Show a mint's metadata and whether it is locked
    ViewMetadata {
        #[arg(long)]
        mint: Address,
    },
    /// Create a mint's metadata (wallet must be mint authority)
    CreateMetadata {
        #[arg(long)]
        mint: Address,
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        uri: String,
    },
    /// Make a mint's metadata immutable (wallet must be update authority)
    Lock {
        #[arg(long)]
        mint: Address,
    },
    /// Create the sale mint with the wallet as mint authority
    CreateMint {
        /// Mint keypair file, generated if absent
        #[arg(long)]
        mint_keypair: PathBuf,
        #[arg(long, default_value_t = DECIMALS)]
        decimals: u8,
    },
    /// Initialize the sale and hand mint authority to the program
    Initialize {
        #[arg(long)]
        mint: Address,
        /// Sale end, unix seconds
        #[arg(long, conflicts_with = "sale_days", required_unless_present = "sale_days")]
        sale_end: Option<i64>,
        /// Sale end, days from now
        #[arg(long)]
        sale_days: Option<u32>,
    },
    /// Buy tokens, 1 lamport per base unit
    Buy {
        #[arg(long)]
        lamports: u64,
    },
    /// Redeem base units back for lamports
    Redeem {
        #[arg(long)]
        amount: u64,
    },
    /// Sale summary, optionally with a wallet's balance
    Report {
        #[arg(long)]
        owner: Option<Address>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let session = Session {
        rpc_url: cli.rpc_url,
        commitment: cli.commitment,
        wallet: cli.wallet,
        program_id: cli.program_id,
        idl: cli.idl,
        poll: commands::poll_policy(cli.poll_attempts, cli.poll_delay_ms),
        json: cli.json,
    };
    tracing::debug!(rpc = %session.rpc_url, commitment = %session.commitment, "session");

    match cli.command {
        Command::Selector { name, account } => commands::selector(&session, &name, account),
        Command::Pda { mint, owner } => commands::pda(&session, mint, owner),
        Command::Resolve { operation, bindings, args } => {
            commands::resolve(&session, &operation, &bindings, &args)
        }
        Command::Inspect { operation, data } => commands::inspect(&session, &operation, &data),
        Command::ViewMetadata { mint } => commands::view_metadata(&session, &mint),
        Command::CreateMetadata { mint, name, symbol, uri } => {
            commands::create_metadata(&session, &mint, &MetadataFields::new(name, symbol, uri))
        }
        Command::Lock { mint } => commands::lock(&session, &mint),
        Command::CreateMint { mint_keypair, decimals } => {
            commands::create_mint(&session, &mint_keypair, decimals)
        }
        Command::Initialize { mint, sale_end, sale_days } => {
            let sale_end = match (sale_end, sale_days) {
                (Some(ts), _) => ts,
                (None, Some(days)) => commands::sale_end_in_days(unix_now(), days),
                (None, None) => anyhow::bail!("pass --sale-end or --sale-days"),
            };
            commands::initialize(&session, &mint, sale_end)
        }
        Command::Buy { lamports } => commands::buy(&session, lamports),
        Command::Redeem { amount } => commands::redeem(&session, amount),
        Command::Report { owner } => commands::report(&session, owner),
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        "fairmint=debug,fair_token=debug,ledger_rpc=debug,ledger_ix=debug,info"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
        }))
        .init();
}

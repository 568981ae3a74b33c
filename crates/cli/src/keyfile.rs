//! Keypair files: a JSON array of the 64 `secret || public` bytes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ledger_ix::Keypair;
use zeroize::Zeroizing;

/// `$HOME/.config/solana/id.json`
pub fn default_wallet_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".config/solana/id.json"))
}

pub fn read_keypair_file(path: &Path) -> Result<Keypair> {
    let text = Zeroizing::new(
        fs::read_to_string(path)
            .with_context(|| format!("failed to read keypair file {}", path.display()))?,
    );
    let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
        serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON byte array", path.display()))?,
    );
    Keypair::from_bytes(&bytes).with_context(|| format!("invalid keypair in {}", path.display()))
}

/// Write `keypair` to a new file, owner-readable only on Unix. Refuses to
/// overwrite.
pub fn write_keypair_file(path: &Path, keypair: &Keypair) -> Result<()> {
    let bytes = keypair.to_bytes();
    let text = Zeroizing::new(serde_json::to_string(&bytes.as_slice())?);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create keypair file {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write keypair file {}", path.display()))?;
    Ok(())
}

/// Load the keypair at `path`, generating and saving one if it is absent.
pub fn load_or_create(path: &Path) -> Result<(Keypair, bool)> {
    if path.exists() {
        return Ok((read_keypair_file(path)?, false));
    }
    let keypair = Keypair::generate();
    write_keypair_file(path, &keypair)?;
    Ok((keypair, true))
}

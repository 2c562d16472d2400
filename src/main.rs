//! Command-line driver for the rewrap engine.
//!
//! Three mutually exclusive operations over blob files:
//!
//! ```text
//! rewrap encrypt   secrets.txt --kek-out kek.key
//! rewrap reencrypt secrets.txt --kek kek.key --kek-out kek.key
//! rewrap decrypt   secrets.txt --kek kek.key -o secrets.out
//! ```
//!
//! The output path defaults to rewriting the input in place. KEK files are
//! raw 32-byte keys with no framing; any other size is rejected. `encrypt`
//! and `reencrypt` write the new access KEK to `--kek-out`, overwriting a
//! pre-existing file (passing the same path for `--kek` and `--kek-out`
//! rotates the key file in place).

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter};

use rewrap::{decrypt, encrypt, gen_key, gen_random_iv, reencrypt, KEY_SIZE};

#[derive(Debug, Parser)]
#[command(
    name = "rewrap",
    version,
    about = "Nested re-encryption of sealed blobs with KEK rotation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seal a plaintext file into a fresh blob and write the generated KEK
    Encrypt {
        /// File to seal
        input: PathBuf,
        /// Output blob path (defaults to rewriting the input in place)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Where to write the generated key-encryption key
        #[arg(long, default_value = "kek.key")]
        kek_out: PathBuf,
    },
    /// Add one encryption layer to a blob and rotate its KEK
    Reencrypt {
        /// Blob to re-wrap
        input: PathBuf,
        /// Output blob path (defaults to rewriting the input in place)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Current key-encryption key file
        #[arg(long, default_value = "kek.key")]
        kek: PathBuf,
        /// Where to write the rotated key-encryption key
        #[arg(long, default_value = "kek.key")]
        kek_out: PathBuf,
    },
    /// Peel every layer of a blob and recover the plaintext
    Decrypt {
        /// Blob to unseal
        input: PathBuf,
        /// Output plaintext path (defaults to rewriting the input in place)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Current key-encryption key file
        #[arg(long, default_value = "kek.key")]
        kek: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env()?,
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Encrypt {
            input,
            output,
            kek_out,
        } => do_encrypt(&input, output.as_deref().unwrap_or(&input), &kek_out),
        Command::Reencrypt {
            input,
            output,
            kek,
            kek_out,
        } => do_reencrypt(&input, output.as_deref().unwrap_or(&input), &kek, &kek_out),
        Command::Decrypt { input, output, kek } => {
            do_decrypt(&input, output.as_deref().unwrap_or(&input), &kek)
        }
    }
}

fn do_encrypt(input: &Path, output: &Path, kek_out: &Path) -> Result<()> {
    let started = Instant::now();
    let plaintext = fs_err::read(input)?;

    let kek = gen_key();
    let blob = encrypt(&plaintext, &kek, gen_random_iv()).context("encrypt failed")?;

    fs_err::write(output, &blob)?;
    write_kek_file(kek_out, &kek)?;
    debug!(
        blob_len = blob.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "sealed {} -> {}",
        input.display(),
        output.display()
    );
    Ok(())
}

fn do_reencrypt(input: &Path, output: &Path, kek_path: &Path, kek_out: &Path) -> Result<()> {
    let started = Instant::now();
    let blob = fs_err::read(input)?;
    let kek = read_kek_file(kek_path)?;

    let (blob, new_kek) = reencrypt(&blob, &kek).context("reencrypt failed")?;

    fs_err::write(output, &blob)?;
    write_kek_file(kek_out, &new_kek)?;
    debug!(
        blob_len = blob.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "re-wrapped {} -> {}",
        input.display(),
        output.display()
    );
    Ok(())
}

fn do_decrypt(input: &Path, output: &Path, kek_path: &Path) -> Result<()> {
    let started = Instant::now();
    let blob = fs_err::read(input)?;
    let kek = read_kek_file(kek_path)?;

    let plaintext = decrypt(&blob, &kek).context("decrypt failed")?;

    fs_err::write(output, &plaintext)?;
    debug!(
        plaintext_len = plaintext.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "unsealed {} -> {}",
        input.display(),
        output.display()
    );
    Ok(())
}

/// Reads a raw 32-byte KEK file. No header, no framing.
fn read_kek_file(path: &Path) -> Result<Vec<u8>> {
    let kek = fs_err::read(path)?;
    if kek.len() != KEY_SIZE {
        bail!(
            "KEK file {} has bad size: expected {} bytes, got {}",
            path.display(),
            KEY_SIZE,
            kek.len()
        );
    }
    Ok(kek)
}

/// Writes a raw KEK file, owner-readable only where the platform supports it.
fn write_kek_file(path: &Path, kek: &[u8]) -> Result<()> {
    fs_err::write(path, kek).context("can't write KEK file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs_err::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

//! claw-keygen — generate a node signing key under a keystore directory and
//! print its DID and address. Written in the same small-CLI idiom as
//! `claw-node`'s own `main.rs`.

use clap::Parser;

use claw_core::identity::{address_from_public_key, did_from_public_key};
use claw_core::keystore::Keystore;

#[derive(Parser, Debug)]
#[command(name = "claw-keygen", version, about = "Generate a claw node signing key")]
struct Args {
    /// Keystore directory (a `<data-dir>/keystore` from an existing node works).
    #[arg(long)]
    dir: std::path::PathBuf,

    /// Key id to create; `claw-node` looks this up via `CLAW_KEY_ID`.
    #[arg(long, default_value = "node")]
    key_id: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let passphrase = std::env::var("CLAW_PASSPHRASE")
        .map_err(|_| anyhow::anyhow!("CLAW_PASSPHRASE must be set; a passphrase is never accepted as a CLI argument"))?;

    let keystore = Keystore::open(&args.dir).map_err(|e| anyhow::anyhow!("opening keystore: {e}"))?;
    if keystore.public_key(&args.key_id).is_ok() {
        anyhow::bail!("key id '{}' already exists in {}", args.key_id, args.dir.display());
    }
    let public_key = keystore
        .create(&args.key_id, &passphrase)
        .map_err(|e| anyhow::anyhow!("creating key: {e}"))?;

    println!("key_id:  {}", args.key_id);
    println!("did:     {}", did_from_public_key(&public_key));
    println!("address: {}", address_from_public_key(&public_key));
    Ok(())
}

//! Utility program to decrypt and display a key blob created by a software-only device.
//!
//! Usage: `keyblob-dump [--hex] [--app-id=STR] [--app-data=STR] FILE...`
//!
//! Options apply to the files that follow them; `--hex` toggles whether file contents are
//! hex-encoded.

// Explicitly include alloc because macros from `kmr_common` assume it.
extern crate alloc;

use kmr_common::{
    crypto,
    keyblob::{self, KeyBlob},
};
use kmr_crypto_boring::{aes::BoringAes, hmac::BoringHmac, rng::BoringRng};
use kmr_wire::{authorization, tags, AuthorizationSet};

const SOFTWARE_ROOT_OF_TRUST: &[u8] = b"SW";

#[derive(Default)]
struct Options {
    hex: bool,
    app_id: Option<String>,
    app_data: Option<String>,
}

impl Options {
    fn hidden_params(&self) -> AuthorizationSet {
        let mut params = Vec::new();
        if let Some(app_id) = &self.app_id {
            params.push(authorization(tags::APPLICATION_ID, app_id.as_bytes()));
        }
        if let Some(app_data) = &self.app_data {
            params.push(authorization(tags::APPLICATION_DATA, app_data.as_bytes()));
        }
        AuthorizationSet::from_params(&params)
    }
}

fn main() {
    let _ = env_logger::builder().try_init();
    let mut opts = Options::default();
    let mut failed = false;
    for arg in std::env::args().skip(1) {
        if arg == "--hex" {
            opts.hex = !opts.hex;
        } else if let Some(value) = arg.strip_prefix("--app-id=") {
            opts.app_id = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--app-data=") {
            opts.app_data = Some(value.to_string());
        } else if let Err(msg) = process(&arg, &opts) {
            eprintln!("{}: {}", arg, msg);
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn process(filename: &str, opts: &Options) -> Result<(), String> {
    let mut data =
        std::fs::read(filename).map_err(|e| format!("Failed to read file: {:?}", e))?;
    if opts.hex {
        let hexdata = std::str::from_utf8(&data)
            .map_err(|e| format!("Failed to read hex as UTF-8: {:?}", e))?
            .trim();
        data = hex::decode(hexdata)
            .map_err(|e| format!("Failed to parse hex ({:?}): len={}", e, hexdata.len()))?;
    }

    let hidden = keyblob::hidden(&opts.hidden_params(), SOFTWARE_ROOT_OF_TRUST)
        .map_err(|e| format!("Failed to build hidden params: {:?}", e))?;
    let root_kek = crypto::hmac::Key::new_from(keyblob::SOFTWARE_ROOT_KEK)
        .map_err(|e| format!("Failed to load root key: {:?}", e))?;
    let keyblob = KeyBlob::deserialize(&BoringAes, &BoringHmac, &root_kek, &data, &hidden)
        .map_err(|e| format!("Failed to parse: {:?}", e))?;
    println!(
        "{}: KeyBlob {{\n  key_material=...(len {}),\n  enforced={:?},\n  unenforced={:?},\n}}",
        filename,
        keyblob.key_material.0.len(),
        keyblob.enforced,
        keyblob.unenforced
    );

    // Re-encrypting under a fresh nonce must give a blob that decrypts to the same contents.
    let regenerated = keyblob
        .serialize(&BoringAes, &BoringHmac, &mut BoringRng, &root_kek, &hidden)
        .map_err(|e| format!("Failed to re-serialize: {:?}", e))?;
    let reparsed = KeyBlob::deserialize(&BoringAes, &BoringHmac, &root_kek, &regenerated, &hidden)
        .map_err(|e| format!("Failed to parse re-serialized blob: {:?}", e))?;
    if reparsed != keyblob {
        return Err("re-serialized key blob has different contents".to_string());
    }
    Ok(())
}

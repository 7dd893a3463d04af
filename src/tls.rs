//! Loads TLS material from disk into a `tokio-rustls` acceptor.
//!
//! This is the boundary the listener consumes: a private key switches the
//! listening sockets to TLS, the chain provides the served certificates. The
//! rustls backend does not decrypt passphrase-protected PEM keys, so a
//! configured `password` is rejected at bind time.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::error::StartError;
use crate::server::ServerConfig;

/// Builds the acceptor for a configuration, or `None` when no private key is
/// configured (plaintext serving).
pub(crate) fn build_acceptor(config: &ServerConfig) -> Result<Option<TlsAcceptor>, StartError> {
    let key_path = match config.private_key() {
        Some(path) => path,
        None => return Ok(None),
    };

    if config.password().is_some() {
        return Err(StartError::Tls(
            "passphrase-protected private keys are not supported".to_owned(),
        ));
    }

    let chain_path = config.certificate_chain().ok_or_else(|| {
        StartError::Tls("a certificate chain is required alongside the private key".to_owned())
    })?;

    let certs = load_certs(chain_path)?;
    let key = load_key(key_path)?;

    let tls_config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| StartError::Tls(err.to_string()))?;

    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::Certificate>, StartError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|err| StartError::Tls(format!("unable to parse {}: {}", path.display(), err)))?;

    if certs.is_empty() {
        return Err(StartError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs.into_iter().map(rustls::Certificate).collect())
}

fn load_key(path: &Path) -> Result<rustls::PrivateKey, StartError> {
    let mut reader = open(path)?;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|err| StartError::Tls(format!("unable to parse {}: {}", path.display(), err)))?;

    if keys.is_empty() {
        let mut reader = open(path)?;
        keys = rustls_pemfile::rsa_private_keys(&mut reader).map_err(|err| {
            StartError::Tls(format!("unable to parse {}: {}", path.display(), err))
        })?;
    }

    match keys.into_iter().next() {
        Some(key) => Ok(rustls::PrivateKey(key)),
        None => Err(StartError::Tls(format!(
            "no private key found in {}",
            path.display()
        ))),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, StartError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| StartError::Tls(format!("unable to read {}: {}", path.display(), err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_configs_produce_no_acceptor() {
        let config = ServerConfig::new();
        assert!(build_acceptor(&config).unwrap().is_none());
    }

    #[test]
    fn passphrases_are_rejected() {
        let config = ServerConfig::new()
            .with_tls("chain.pem", "key.pem")
            .with_key_password("hunter2");
        assert!(matches!(build_acceptor(&config), Err(StartError::Tls(_))));
    }

    #[test]
    fn unreadable_material_is_a_tls_error() {
        let config = ServerConfig::new().with_tls("/no/such/chain.pem", "/no/such/key.pem");
        assert!(matches!(build_acceptor(&config), Err(StartError::Tls(_))));
    }
}

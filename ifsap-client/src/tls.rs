//! TLS connector for `https` endpoints.

use crate::config::TlsClientConfig;
use crate::transport::TransportError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Creates a TLS connector and the SNI name for `server_host`.
pub fn connector(
    config: &TlsClientConfig,
    server_host: &str,
) -> Result<(TlsConnector, ServerName<'static>), TransportError> {
    let client_config = if config.insecure {
        tracing::warn!("TLS certificate verification disabled for {}", server_host);
        insecure_client_config()
    } else {
        verified_client_config(config)?
    };

    let connector = TlsConnector::from(Arc::new(client_config));

    let server_name_str = config.server_name.as_deref().unwrap_or(server_host);
    let server_name = ServerName::try_from(server_name_str.to_string()).map_err(|_| {
        TransportError::TlsConfig(format!("invalid server name: {}", server_name_str))
    })?;

    Ok((connector, server_name))
}

fn verified_client_config(config: &TlsClientConfig) -> Result<rustls::ClientConfig, TransportError> {
    let root_store = if let Some(ref ca_path) = config.ca_cert_path {
        let mut store = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            store
                .add(cert)
                .map_err(|e| TransportError::TlsConfig(format!("invalid CA cert: {}", e)))?;
        }
        store
    } else {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        store
    };

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TransportError::TlsConfig(format!("invalid client cert/key: {}", e)))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

fn insecure_client_config() -> rustls::ClientConfig {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::UnixTime;
    use rustls::DigitallySignedStruct;

    #[derive(Debug)]
    struct AcceptAnyCert;

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _: &CertificateDer<'_>,
            _: &[CertificateDer<'_>],
            _: &ServerName<'_>,
            _: &[u8],
            _: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            use rustls::SignatureScheme::*;
            vec![
                RSA_PKCS1_SHA256,
                RSA_PKCS1_SHA384,
                RSA_PKCS1_SHA512,
                ECDSA_NISTP256_SHA256,
                ECDSA_NISTP384_SHA384,
                RSA_PSS_SHA256,
                RSA_PSS_SHA384,
                RSA_PSS_SHA512,
                ED25519,
            ]
        }
    }

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth()
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TransportError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        .ok_or_else(|| TransportError::TlsConfig(format!("no private key found in {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_invalid_cert_path() {
        let result = load_certs(Path::new("/nonexistent/cert.pem"));
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_invalid_key_path() {
        let result = load_private_key(Path::new("/nonexistent/key.pem"));
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_key_file_without_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a pem file").unwrap();
        let result = load_private_key(file.path());
        assert!(result.unwrap_err().to_string().contains("no private key"));
    }

    #[test]
    fn test_missing_ca_file() {
        let config = TlsClientConfig::new().with_ca_cert("/nonexistent/ca.pem");
        assert!(connector(&config, "erp.example.com").is_err());
    }

    #[test]
    fn test_invalid_server_name() {
        let config = TlsClientConfig::new().with_server_name("not a host name!");
        let err = connector(&config, "erp.example.com").err().unwrap();
        assert!(err.to_string().contains("invalid server name"));
    }
}

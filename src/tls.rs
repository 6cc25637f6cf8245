use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::connection::Error;

/// Builds a connector from the user supplied TLS settings.
///
/// Without `cacert` or `cacertdir` the bundled Mozilla root store is trusted.
pub fn connector(config: &TlsConfig) -> Result<TlsConnector, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    if let Some(path) = &config.cacert {
        for cert in load_certs(path)? {
            roots.add(cert).map_err(|e| {
                Error::Tls(format!("invalid CA certificate {}: {}", path.display(), e))
            })?;
        }
    }
    if let Some(dir) = &config.cacertdir {
        load_cert_dir(dir, &mut roots)?;
    }
    if config.cacert.is_none() && config.cacertdir.is_none() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots);

    let mut client_config = match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|e| Error::Tls(format!("invalid client certificate: {}", e)))?,
        (Some(_), None) => {
            return Err(Error::Tls("--cert requires --key".to_string()));
        }
        _ => builder.with_no_client_auth(),
    };

    if config.insecure {
        warn!("TLS certificate verification is disabled");
        client_config
            .dangerous()
            .set_certificate_verifier(Arc::new(SkipServerVerification(provider)));
    }

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// The name the server certificate is checked against, `--sni` overrides the host.
pub fn server_name(config: &TlsConfig, host: &str) -> Result<ServerName<'static>, Error> {
    let name = config.sni.as_deref().unwrap_or(host);
    ServerName::try_from(name.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name {:?}: {}", name, e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to open {}: {}", path.display(), e)))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to read {}: {}", path.display(), e)))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to open {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Tls(format!("failed to read {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

// Unreadable files are skipped, the directory may hold more than certificates.
fn load_cert_dir(dir: &Path, roots: &mut RootCertStore) -> Result<(), Error> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Tls(format!("failed to read directory {}: {}", dir.display(), e)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        match load_certs(&path) {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                debug!(path = %path.display(), added, ignored, "loaded CA certificates");
            }
            Err(e) => warn!("Failed to read certificate file {}: {}", path.display(), e),
        }
    }

    Ok(())
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

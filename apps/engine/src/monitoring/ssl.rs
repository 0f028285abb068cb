//! Certificate inspection over a dedicated TLS handshake.
//!
//! The inspector never trusts or rejects anything: it only reads the leaf
//! certificate, so expired and self-signed certificates are still reported.
//! Failures here never influence a check's status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub expires_at: DateTime<Utc>,
    /// Whole days until expiry; negative once expired
    pub days_remaining: i64,
    pub issuer: String,
}

#[derive(Debug, Error)]
pub enum SslInspectionError {
    #[error("not an https target")]
    NotHttps,
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("TLS handshake timed out")]
    Timeout,
    #[error("TLS connection failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("peer presented no certificate")]
    NoCertificate,
    #[error("could not parse certificate: {0}")]
    Parse(String),
}

/// Whether `url` gets a certificate inspection at all.
pub fn is_https(url: &str) -> bool {
    Url::parse(url).map(|u| u.scheme() == "https").unwrap_or(false)
}

#[async_trait::async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, url: &str, now: DateTime<Utc>) -> Result<CertificateInfo, SslInspectionError>;
}

/// Accepts any certificate chain while still checking handshake signatures,
/// so the connection completes and the leaf can be read.
#[derive(Debug)]
struct InspectOnlyVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for InspectOnlyVerifier {
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
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS-only inspector, independent of the HTTP probe's connection.
pub struct TlsInspector {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsInspector {
    pub fn new(timeout: Duration) -> Result<Self, SslInspectionError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InspectOnlyVerifier { provider }))
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)), timeout })
    }

    async fn fetch_leaf(&self, url: &str) -> Result<CertificateDer<'static>, SslInspectionError> {
        let url = Url::parse(url).map_err(|e| SslInspectionError::InvalidTarget(e.to_string()))?;
        if url.scheme() != "https" {
            return Err(SslInspectionError::NotHttps);
        }
        let port = url.port_or_known_default().unwrap_or(443);

        let (address, server_name) = match url.host() {
            Some(Host::Domain(domain)) => {
                let name = ServerName::try_from(domain.to_string())
                    .map_err(|e| SslInspectionError::InvalidTarget(e.to_string()))?;
                (domain.to_string(), name)
            }
            Some(Host::Ipv4(ip)) => (ip.to_string(), ServerName::from(std::net::IpAddr::V4(ip))),
            Some(Host::Ipv6(ip)) => (ip.to_string(), ServerName::from(std::net::IpAddr::V6(ip))),
            None => return Err(SslInspectionError::InvalidTarget("URL has no host".into())),
        };

        let tcp = TcpStream::connect((address.as_str(), port)).await?;
        let stream = self.connector.connect(server_name, tcp).await?;
        let (_, session) = stream.get_ref();

        session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| leaf.clone().into_owned())
            .ok_or(SslInspectionError::NoCertificate)
    }
}

#[async_trait::async_trait]
impl CertificateInspector for TlsInspector {
    async fn inspect(&self, url: &str, now: DateTime<Utc>) -> Result<CertificateInfo, SslInspectionError> {
        let leaf = timeout(self.timeout, self.fetch_leaf(url))
            .await
            .map_err(|_| SslInspectionError::Timeout)??;
        certificate_info(leaf.as_ref(), now)
    }
}

/// Expiry and issuer of a DER-encoded certificate, relative to `now`.
pub fn certificate_info(der: &[u8], now: DateTime<Utc>) -> Result<CertificateInfo, SslInspectionError> {
    let (_, certificate) =
        x509_parser::parse_x509_certificate(der).map_err(|e| SslInspectionError::Parse(e.to_string()))?;

    let not_after = certificate.validity().not_after.timestamp();
    let expires_at = DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| SslInspectionError::Parse(format!("expiry out of range: {not_after}")))?;

    let issuer_name = certificate.issuer();
    let issuer = issuer_name
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .or_else(|| issuer_name.iter_common_name().next().and_then(|attr| attr.as_str().ok()))
        .map(str::to_string)
        .unwrap_or_else(|| issuer_name.to_string());

    Ok(CertificateInfo { expires_at, days_remaining: (expires_at - now).num_days(), issuer })
}

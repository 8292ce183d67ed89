use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::config::Config;
use crate::schema::{Target, TimingsMs, TlsArtifact};

/// Accepts every presented certificate chain. The scan exists to observe
/// broken TLS, so the handshake must succeed against expired, self-signed
/// and mis-issued certificates alike.
#[derive(Debug)]
struct ObserveOnlyVerifier;

impl ServerCertVerifier for ObserveOnlyVerifier {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn permissive_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(ObserveOnlyVerifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

fn timestamp_to_iso(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn asn1_to_iso(time: &ASN1Time) -> Option<String> {
    timestamp_to_iso(time.timestamp())
}

/// Fill certificate metadata from the DER-encoded leaf.
fn apply_certificate(der: &[u8], artifact: &mut TlsArtifact) {
    artifact.hash = Some(format!("sha256:{:x}", Sha256::digest(der)));
    let Ok((_, cert)) = parse_x509_certificate(der) else {
        artifact.error = Some("certificate_parse_failed".to_string());
        return;
    };
    artifact.cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);
    artifact.san = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    GeneralName::IPAddress(bytes) => match bytes.len() {
                        4 => Some(format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])),
                        16 => <[u8; 16]>::try_from(*bytes)
                            .ok()
                            .map(|b| std::net::Ipv6Addr::from(b).to_string()),
                        _ => None,
                    },
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    artifact.issuer_dn = Some(cert.issuer().to_string());
    artifact.serial = Some(cert.raw_serial_as_string());
    artifact.not_before = asn1_to_iso(&cert.validity().not_before);
    artifact.not_after = asn1_to_iso(&cert.validity().not_after);
    // Heuristic only; a real chain check is out of scope for observation.
    artifact.self_signed = cert.subject() == cert.issuer();
}

/// Open a permissive handshake against the target's first resolved address
/// and record what the session and leaf certificate reveal. Socket-level
/// failures yield an artifact with `error` set and empty fields.
pub async fn collect_tls(target: &Target, cfg: &Config) -> TlsArtifact {
    let t0 = Instant::now();
    let port = if target.scheme == "https" { target.port } else { 443 };
    let ip = target
        .resolved_ips
        .first()
        .cloned()
        .unwrap_or_else(|| target.host.clone());
    let mut artifact = TlsArtifact::for_target(target, ip.clone(), port);
    let budget = Duration::from_secs_f64(cfg.tls_timeout);

    let result = handshake(&ip, port, &target.host, budget, &mut artifact).await;
    if let Err(e) = result {
        artifact.error = Some(e);
    }
    artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
    artifact
}

async fn handshake(
    ip: &str,
    port: u16,
    host: &str,
    budget: Duration,
    artifact: &mut TlsArtifact,
) -> Result<(), String> {
    let config = permissive_config().map_err(|e| format!("tls_config_failed: {e}"))?;
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = timeout(budget, TcpStream::connect((ip, port)))
        .await
        .map_err(|_| "connect_timeout".to_string())?
        .map_err(|e| format!("connect_failed: {e}"))?;

    let server_name = match host.parse::<IpAddr>() {
        Ok(ip) => ServerName::from(rustls::pki_types::IpAddr::from(ip)),
        Err(_) => ServerName::try_from(host.to_string())
            .map_err(|e| format!("invalid_server_name: {e}"))?,
    };
    let stream = timeout(budget, connector.connect(server_name, tcp))
        .await
        .map_err(|_| "handshake_timeout".to_string())?
        .map_err(|e| format!("handshake_failed: {e}"))?;

    let (_, session) = stream.get_ref();
    artifact.protocol = session.protocol_version().map(|v| format!("{v:?}"));
    artifact.cipher = session
        .negotiated_cipher_suite()
        .map(|s| format!("{:?}", s.suite()));
    artifact.alpn = session
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).to_string());
    if let Some(der) = session.peer_certificates().and_then(|certs| certs.first()) {
        apply_certificate(der.as_ref(), artifact);
    }
    Ok(())
}

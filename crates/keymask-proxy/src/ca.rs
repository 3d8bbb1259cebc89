//! Root certificate authority for TLS interception.
//!
//! The root is a self-signed RSA-4096 certificate valid for ten years,
//! persisted as PEM with mode 0600 (`CERTIFICATE` plus a PKCS#1
//! `RSA PRIVATE KEY` block; PKCS#8 keys are accepted on load). Leaves are
//! RSA-2048, carry the requested hostname as CN and SAN, and are valid from
//! an hour in the past to a year out.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, PKCS_RSA_SHA256,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rustls::crypto::aws_lc_rs::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::CertifiedKey;
use time::{Duration, OffsetDateTime};

use crate::error::CaError;

/// Root key size in bits.
const CA_KEY_BITS: usize = 4096;
/// Leaf key size in bits.
const LEAF_KEY_BITS: usize = 2048;
/// Root validity.
const CA_VALIDITY_DAYS: i64 = 10 * 365;
/// Leaf validity.
const LEAF_VALIDITY_DAYS: i64 = 365;

const CA_COMMON_NAME: &str = "Keymask Root CA";
const ORGANIZATION: &str = "Keymask";

/// A loaded root CA, able to mint per-host leaf certificates.
pub struct CertificateAuthority {
    issuer: Issuer<'static, KeyPair>,
    ca_cert_pem: String,
    ca_cert_der: CertificateDer<'static>,
}

impl CertificateAuthority {
    /// Generates a new self-signed root and persists it with the default
    /// key size.
    pub fn generate(cert_path: &Path, key_path: &Path) -> Result<(), CaError> {
        Self::generate_with_bits(cert_path, key_path, CA_KEY_BITS)
    }

    /// Generates a root with an explicit RSA key size.
    pub fn generate_with_bits(
        cert_path: &Path,
        key_path: &Path,
        bits: usize,
    ) -> Result<(), CaError> {
        let rsa_key = generate_rsa_key(bits)?;
        let key_pair = rcgen_key_pair(&rsa_key)?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        dn.push(DnType::OrganizationName, ORGANIZATION);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(1));
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = OffsetDateTime::now_utc() - Duration::hours(1);
        params.not_after = OffsetDateTime::now_utc() + Duration::days(CA_VALIDITY_DAYS);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Generation(e.to_string()))?;

        let key_pem = rsa_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CaError::Generation(e.to_string()))?;

        write_private(cert_path, cert.pem().as_bytes())?;
        write_private(key_path, key_pem.as_bytes())?;

        tracing::info!(cert = %cert_path.display(), key = %key_path.display(), "generated root CA");
        Ok(())
    }

    /// Loads the root from PEM files. The key may be PKCS#1 or PKCS#8.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, CaError> {
        let cert_pem = fs::read_to_string(cert_path)?;
        let key_pem = fs::read_to_string(key_path)?;

        let rsa_key = RsaPrivateKey::from_pkcs1_pem(&key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&key_pem))
            .map_err(|e| CaError::Parse(format!("CA key is neither PKCS#1 nor PKCS#8: {e}")))?;
        let key_pair = rcgen_key_pair(&rsa_key)?;

        let issuer = Issuer::from_ca_cert_pem(&cert_pem, key_pair)
            .map_err(|e| CaError::Parse(e.to_string()))?;

        let ca_cert_der = parse_cert_der(&cert_pem)?;

        Ok(Self {
            issuer,
            ca_cert_pem: cert_pem,
            ca_cert_der,
        })
    }

    /// Loads the root, generating it first when the files are missing.
    pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<Self, CaError> {
        if !cert_path.exists() || !key_path.exists() {
            Self::generate(cert_path, key_path)?;
        }
        Self::load(cert_path, key_path)
    }

    /// The root certificate in PEM form, for client installation.
    pub fn cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// The root certificate in DER form.
    pub fn cert_der(&self) -> CertificateDer<'static> {
        self.ca_cert_der.clone()
    }

    /// Mints a leaf for `hostname`, signed by the root, ready for use as a
    /// rustls server certificate. Numeric hostnames get an IP SAN.
    pub fn issue(&self, hostname: &str) -> Result<CertifiedKey, CaError> {
        let leaf_key = generate_rsa_key(LEAF_KEY_BITS)?;
        let key_pair = rcgen_key_pair(&leaf_key)?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, hostname);
        dn.push(DnType::OrganizationName, ORGANIZATION);
        params.distinguished_name = dn;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.not_before = OffsetDateTime::now_utc() - Duration::hours(1);
        params.not_after = OffsetDateTime::now_utc() + Duration::days(LEAF_VALIDITY_DAYS);

        match hostname.parse::<IpAddr>() {
            Ok(ip) => params.subject_alt_names.push(SanType::IpAddress(ip)),
            Err(_) => {
                let name = Ia5String::try_from(hostname.to_string())
                    .map_err(|e| CaError::Generation(e.to_string()))?;
                params.subject_alt_names.push(SanType::DnsName(name));
            }
        }

        let cert = params
            .signed_by(&key_pair, &self.issuer)
            .map_err(|e| CaError::Generation(e.to_string()))?;

        let key_der = leaf_key
            .to_pkcs8_der()
            .map_err(|e| CaError::Generation(e.to_string()))?;
        let signing_key = any_supported_type(&PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            key_der.as_bytes().to_vec(),
        )))
        .map_err(|e| CaError::Generation(e.to_string()))?;

        let chain = vec![cert.der().clone(), self.ca_cert_der.clone()];
        Ok(CertifiedKey::new(chain, signing_key))
    }
}

fn generate_rsa_key(bits: usize) -> Result<RsaPrivateKey, CaError> {
    let mut rng = rand::rngs::OsRng;
    RsaPrivateKey::new(&mut rng, bits).map_err(|e| CaError::Generation(e.to_string()))
}

/// Bridges an RSA key into rcgen's signing key type.
fn rcgen_key_pair(key: &RsaPrivateKey) -> Result<KeyPair, CaError> {
    let pkcs8 = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CaError::Generation(e.to_string()))?;
    KeyPair::from_pem_and_sign_algo(&pkcs8, &PKCS_RSA_SHA256)
        .map_err(|e| CaError::Parse(e.to_string()))
}

fn parse_cert_der(cert_pem: &str) -> Result<CertificateDer<'static>, CaError> {
    let mut reader = std::io::Cursor::new(cert_pem.as_bytes());
    let cert = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| CaError::Parse("no CERTIFICATE block in CA file".into()))?
        .map_err(|e| CaError::Parse(e.to_string()));
    cert
}

/// Writes a file with mode 0600, creating parent directories with 0750.
fn write_private(path: &Path, contents: &[u8]) -> Result<(), CaError> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| CaError::Write(e.to_string()))?;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o750))
                .map_err(|e| CaError::Write(e.to_string()))?;
        }
    }
    fs::write(path, contents).map_err(|e| CaError::Write(e.to_string()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| CaError::Write(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generate_small(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let cert = dir.path().join("certs/ca.crt");
        let key = dir.path().join("certs/ca.key");
        CertificateAuthority::generate_with_bits(&cert, &key, 2048).unwrap();
        (cert, key)
    }

    #[test]
    fn generate_persists_pem_files_with_restrictive_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);

        let cert_pem = fs::read_to_string(&cert).unwrap();
        let key_pem = fs::read_to_string(&key).unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN RSA PRIVATE KEY"));

        let mode = fs::metadata(&key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_accepts_generated_material() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);

        let ca = CertificateAuthority::load(&cert, &key).unwrap();
        assert!(ca.cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(!ca.cert_der().as_ref().is_empty());
    }

    #[test]
    fn load_accepts_pkcs8_keys() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);

        // Rewrite the key as PKCS#8 and reload.
        let pem = fs::read_to_string(&key).unwrap();
        let rsa_key = RsaPrivateKey::from_pkcs1_pem(&pem).unwrap();
        let pkcs8 = rsa_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        fs::write(&key, pkcs8.as_bytes()).unwrap();

        assert!(CertificateAuthority::load(&cert, &key).is_ok());
    }

    #[test]
    fn load_or_generate_loads_existing_material() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);
        let before = fs::read(&cert).unwrap();

        let ca = CertificateAuthority::load_or_generate(&cert, &key).unwrap();
        assert!(ca.issue("api.example.com").is_ok());
        // Existing material is loaded, not regenerated.
        assert_eq!(fs::read(&cert).unwrap(), before);
    }

    #[test]
    fn issued_leaf_carries_the_chain() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);
        let ca = CertificateAuthority::load(&cert, &key).unwrap();

        let leaf = ca.issue("api.openai.com").unwrap();
        assert_eq!(leaf.cert.len(), 2);
        assert_eq!(leaf.cert[1].as_ref(), ca.cert_der().as_ref());
    }

    #[test]
    fn numeric_hostnames_are_issued() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = generate_small(&dir);
        let ca = CertificateAuthority::load(&cert, &key).unwrap();
        assert!(ca.issue("127.0.0.1").is_ok());
    }
}

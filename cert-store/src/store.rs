use crate::error::{CertStoreError, Result};
use crate::fs::{Filesystem, OsFs};
use crate::host::host_ips;
use crate::pem::{encode_key_pem, parse_certs_pem, parse_rsa_key_pem, Certificate};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

pub const DEFAULT_CA_NAME: &str = "ca";

const RSA_KEY_BITS: usize = 2048;
const CA_VALIDITY: Duration = Duration::days(3650);
const LEAF_VALIDITY: Duration = Duration::days(365);
const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

/// Subject alternative names for a server leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltNames {
    pub dns_names: Vec<String>,
    pub ips: Vec<IpAddr>,
}

impl AltNames {
    fn to_san_types(&self) -> Result<Vec<SanType>> {
        let mut sans = Vec::with_capacity(self.dns_names.len() + self.ips.len());
        for name in &self.dns_names {
            let name = name
                .as_str()
                .try_into()
                .map_err(|e| CertStoreError::generate("subject alternative name", e))?;
            sans.push(SanType::DnsName(name));
        }
        sans.extend(self.ips.iter().copied().map(SanType::IpAddress));
        Ok(sans)
    }
}

#[derive(Debug)]
struct Authority {
    cert: Certificate,
    key: RsaPrivateKey,
}

/// A directory of PEM pairs anchored by a self-signed CA.
///
/// Files are `<lower(name)>.crt` (0644) and `<lower(name)>.key` (0600). The CA
/// must be initialised with [`CertStore::init_ca`], [`CertStore::load_ca`] or
/// [`CertStore::new_ca`] before leaves can be issued.
#[derive(Debug)]
pub struct CertStore<F: Filesystem = OsFs> {
    fs: F,
    dir: PathBuf,
    organization: Vec<String>,
    ca_name: String,
    ca: Option<Authority>,
}

impl CertStore<OsFs> {
    pub fn new(dir: impl Into<PathBuf>, organization: &[String]) -> Result<Self> {
        Self::with_fs(OsFs, dir, organization)
    }
}

impl<F: Filesystem> CertStore<F> {
    pub fn with_fs(fs: F, dir: impl Into<PathBuf>, organization: &[String]) -> Result<Self> {
        let dir = dir.into();
        fs.create_dir_all(&dir)
            .map_err(|e| CertStoreError::io("create directory", &dir, e))?;
        Ok(Self {
            fs,
            dir,
            organization: organization.to_vec(),
            ca_name: DEFAULT_CA_NAME.to_string(),
            ca: None,
        })
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// Load the CA if it is on disk, create it otherwise.
    pub fn init_ca(&mut self, ca: &[&str]) -> Result<()> {
        match self.load_ca(ca) {
            Err(e) if e.is_not_found() => {
                tracing::info!(ca = %self.ca_name, dir = %self.dir.display(), "Creating certificate authority");
                self.new_ca(ca)
            }
            other => other,
        }
    }

    /// Adopt an existing CA pair. A lone key file is enough: the self-signed
    /// certificate is regenerated from it and both files are rewritten.
    pub fn load_ca(&mut self, ca: &[&str]) -> Result<()> {
        self.ca_name = resolve_ca_name(ca)?;

        if self.pair_exists(&self.ca_name) {
            let (cert, key) = self.read(&self.ca_name)?;
            self.ca = Some(Authority { cert, key });
            tracing::debug!(ca = %self.ca_name, "Loaded certificate authority");
            return Ok(());
        }

        let key_file = self.key_file(&self.ca_name);
        if self.fs.exists(&key_file) {
            let data = self
                .fs
                .read(&key_file)
                .map_err(|e| CertStoreError::io("read private key", &key_file, e))?;
            let key = parse_rsa_key_pem(&data, &key_file)?;
            tracing::info!(ca = %self.ca_name, "Recreating CA certificate from existing key");
            return self.create_ca_from_key(key);
        }

        Err(CertStoreError::NotFound {
            path: self.cert_file(&self.ca_name),
        })
    }

    pub fn new_ca(&mut self, ca: &[&str]) -> Result<()> {
        self.ca_name = resolve_ca_name(ca)?;
        let key = generate_rsa_key()?;
        self.create_ca_from_key(key)
    }

    fn create_ca_from_key(&mut self, key: RsaPrivateKey) -> Result<()> {
        let signing_key = to_key_pair(&key)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&self.ca_name, &self.organization)?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
        set_validity_and_serial(&mut params, CA_VALIDITY);

        let cert = params
            .self_signed(&signing_key)
            .map_err(|e| CertStoreError::generate("self-signed certificate", e))?;
        let cert = Certificate::from(cert.der().clone());

        self.write(&self.ca_name, &cert, &key)?;
        self.ca = Some(Authority { cert, key });
        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.dir
    }

    pub fn ca_name(&self) -> &str {
        &self.ca_name
    }

    pub fn ca_cert(&self) -> Result<Vec<u8>> {
        Ok(self.authority()?.cert.to_pem())
    }

    pub fn ca_key(&self) -> Result<Vec<u8>> {
        encode_key_pem(&self.authority()?.key)
    }

    fn authority(&self) -> Result<&Authority> {
        self.ca.as_ref().ok_or_else(|| {
            CertStoreError::Usage(format!(
                "certificate authority `{}` is not initialised",
                self.ca_name
            ))
        })
    }

    /// Server pair for `127.0.0.1` carrying every discovered host address.
    pub fn new_host_cert_pair(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let sans = AltNames {
            dns_names: Vec::new(),
            ips: host_ips().all().collect(),
        };
        self.new_server_cert_pair("127.0.0.1", &sans)
    }

    pub fn new_server_cert_pair(&self, cn: &str, sans: &AltNames) -> Result<(Vec<u8>, Vec<u8>)> {
        self.issue(
            cn,
            &self.organization,
            sans,
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }

    pub fn new_client_cert_pair(
        &self,
        cn: &str,
        organization: &[String],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        self.issue(
            cn,
            organization,
            &AltNames::default(),
            ExtendedKeyUsagePurpose::ClientAuth,
        )
    }

    fn issue(
        &self,
        cn: &str,
        organization: &[String],
        sans: &AltNames,
        usage: ExtendedKeyUsagePurpose,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let ca = self.authority()?;
        let issuer = Issuer::from_ca_cert_der(ca.cert.der(), to_key_pair(&ca.key)?)
            .map_err(|e| CertStoreError::generate("issuer from CA certificate", e))?;

        let key = generate_rsa_key()?;
        let key_pair = to_key_pair(&key)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(cn, organization)?;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![usage];
        params.subject_alt_names = sans.to_san_types()?;
        params.use_authority_key_identifier_extension = true;
        set_validity_and_serial(&mut params, LEAF_VALIDITY);

        let cert = params
            .signed_by(&key_pair, &issuer)
            .map_err(|e| CertStoreError::generate("signed certificate", e))?;

        Ok((cert.pem().into_bytes(), encode_key_pem(&key)?))
    }

    /// Whether either half of the pair exists.
    pub fn is_exists(&self, name: &str) -> bool {
        self.fs.exists(&self.cert_file(name)) || self.fs.exists(&self.key_file(name))
    }

    pub fn pair_exists(&self, name: &str) -> bool {
        self.fs.exists(&self.cert_file(name)) && self.fs.exists(&self.key_file(name))
    }

    pub fn cert_file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.crt", name.to_lowercase()))
    }

    pub fn key_file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.key", name.to_lowercase()))
    }

    pub fn write(&self, name: &str, cert: &Certificate, key: &RsaPrivateKey) -> Result<()> {
        self.write_bytes(name, &cert.to_pem(), &encode_key_pem(key)?)
    }

    pub fn write_bytes(&self, name: &str, cert: &[u8], key: &[u8]) -> Result<()> {
        let cert_file = self.cert_file(name);
        self.fs
            .write(&cert_file, cert, CERT_MODE)
            .map_err(|e| CertStoreError::io("write", &cert_file, e))?;

        let key_file = self.key_file(name);
        self.fs
            .write(&key_file, key, KEY_MODE)
            .map_err(|e| CertStoreError::io("write", &key_file, e))
    }

    /// The first certificate of `<name>.crt` and the RSA key in `<name>.key`.
    pub fn read(&self, name: &str) -> Result<(Certificate, RsaPrivateKey)> {
        let (cert_pem, key_pem) = self.read_bytes(name)?;
        let cert = parse_certs_pem(&cert_pem, &self.cert_file(name))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CertStoreError::malformed("certificate", &self.cert_file(name), "empty")
            })?;
        let key = parse_rsa_key_pem(&key_pem, &self.key_file(name))?;
        Ok((cert, key))
    }

    pub fn read_bytes(&self, name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let cert_file = self.cert_file(name);
        let cert = self
            .fs
            .read(&cert_file)
            .map_err(|e| CertStoreError::io("read certificate", &cert_file, e))?;

        let key_file = self.key_file(name);
        let key = self
            .fs
            .read(&key_file)
            .map_err(|e| CertStoreError::io("read private key", &key_file, e))?;
        Ok((cert, key))
    }
}

fn resolve_ca_name(ca: &[&str]) -> Result<String> {
    match ca {
        [] => Ok(DEFAULT_CA_NAME.to_string()),
        [name] => Ok((*name).to_string()),
        _ => Err(CertStoreError::Usage(format!("multiple ca given: {:?}", ca))),
    }
}

fn generate_rsa_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
        .map_err(|e| CertStoreError::generate("private key", e))
}

/// rcgen signs through its own key type, which only ingests PKCS#8.
fn to_key_pair(key: &RsaPrivateKey) -> Result<KeyPair> {
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertStoreError::generate("signing key", e))?;
    KeyPair::from_pem(&pem).map_err(|e| CertStoreError::generate("signing key", e))
}

// rcgen keeps one value per attribute type, so only the first organization is encoded.
/// Subjects carry at most one organization.
fn distinguished_name(cn: &str, organization: &[String]) -> Result<DistinguishedName> {
    if organization.len() > 1 {
        return Err(CertStoreError::Usage(format!(
            "expected at most one organization, got {}",
            organization.join(", ")
        )));
    }
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    if let Some(org) = organization.first() {
        dn.push(DnType::OrganizationName, org.as_str());
    }
    Ok(dn)
}

fn set_validity_and_serial(params: &mut CertificateParams, validity: Duration) {
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::minutes(5);
    params.not_after = now + validity;
    params.serial_number = Some(SerialNumber::from(rand::random::<u64>() >> 1));
}

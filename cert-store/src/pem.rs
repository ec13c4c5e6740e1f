//! PEM encoding and decoding for certificates and RSA keys.

use crate::error::{CertStoreError, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::der::pem;
use rsa::pkcs8::{LineEnding, PrivateKeyInfo};
use rsa::RsaPrivateKey;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;

/// A DER-encoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate(CertificateDer<'static>);

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self(CertificateDer::from(der.into()))
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.0
    }

    pub fn to_pem(&self) -> Vec<u8> {
        encode_cert_pem(self.0.as_ref())
    }
}

impl From<CertificateDer<'static>> for Certificate {
    fn from(der: CertificateDer<'static>) -> Self {
        Self(der)
    }
}

pub fn encode_cert_pem(der: &[u8]) -> Vec<u8> {
    // encoding into a String only fails on a bad label or line-width overflow
    pem::encode_string("CERTIFICATE", LineEnding::LF, der)
        .map(String::into_bytes)
        .unwrap_or_default()
}

/// PKCS#1 (`RSA PRIVATE KEY`) encoding.
pub fn encode_key_pem(key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let pem = key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CertStoreError::generate("private key encoding", e))?;
    Ok(pem.as_bytes().to_vec())
}

/// Every certificate block in `data`, in file order.
pub fn parse_certs_pem(data: &[u8], path: &Path) -> Result<Vec<Certificate>> {
    let certs = CertificateDer::pem_slice_iter(data)
        .map(|c| c.map(Certificate))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertStoreError::malformed("certificate", path, e))?;
    if certs.is_empty() {
        return Err(CertStoreError::malformed(
            "certificate",
            path,
            "no CERTIFICATE block found",
        ));
    }
    Ok(certs)
}

/// Accepts PKCS#1 and PKCS#8 RSA keys. Any other key type is rejected with
/// [`CertStoreError::WrongKeyAlgorithm`].
pub fn parse_rsa_key_pem(data: &[u8], path: &Path) -> Result<RsaPrivateKey> {
    let der = PrivateKeyDer::from_pem_slice(data)
        .map_err(|e| CertStoreError::malformed("private key", path, e))?;

    match der {
        PrivateKeyDer::Pkcs1(key) => RsaPrivateKey::from_pkcs1_der(key.secret_pkcs1_der())
            .map_err(|e| CertStoreError::malformed("private key", path, e)),
        PrivateKeyDer::Pkcs8(key) => {
            let info = PrivateKeyInfo::try_from(key.secret_pkcs8_der())
                .map_err(|e| CertStoreError::malformed("private key", path, e))?;
            if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
                return Err(CertStoreError::WrongKeyAlgorithm {
                    path: path.to_path_buf(),
                });
            }
            RsaPrivateKey::try_from(info)
                .map_err(|e| CertStoreError::malformed("private key", path, e))
        }
        _ => Err(CertStoreError::WrongKeyAlgorithm {
            path: path.to_path_buf(),
        }),
    }
}

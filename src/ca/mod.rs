//! 로컬 개발용 인증 기관(CA) 관리.
//!
//! CA 키 쌍은 사용자별 디렉터리(기본값 `~/.sooproxy`)에 `ca.pem`/`ca.key`로 저장되며,
//! 리프 인증서는 시작할 때마다 메모리에서만 발급합니다.
//!
//! ```no_run
//! use sooproxy::ca::CaStore;
//!
//! let store = CaStore::from_home()?;
//! store.ensure_ca()?;
//! let leaf = store.issue_leaf("example.local")?;
//! let tls = leaf.server_config()?;
//! # Ok::<(), sooproxy::ca::CaError>(())
//! ```

mod error;
mod leaf;
pub mod trust;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls_pki_types::CertificateDer;
use time::{Date, Month, OffsetDateTime};
use tracing::{debug, info};

pub use error::CaError;
pub use leaf::LeafCertificate;
pub use trust::{install_trust, PlatformTrust, TrustInstaller};

pub const CA_DIR_NAME: &str = ".sooproxy";
pub const CA_CERT_FILE: &str = "ca.pem";
pub const CA_KEY_FILE: &str = "ca.key";
pub const CA_COMMON_NAME: &str = "SooProxy CA";
pub const CA_ORGANIZATION: &str = "SooProxy";
pub const CA_SERIAL: u64 = 2019;
pub const CA_VALIDITY_MONTHS: u32 = 12 * 10;
pub const LEAF_VALIDITY_MONTHS: u32 = 3;
pub const DEFAULT_KEY_BITS: usize = 4096;

/// CA 파일이 저장되는 위치. 전역 상태 대신 명시적으로 주입됩니다.
#[derive(Clone)]
pub struct CaStore {
    dir: PathBuf,
    key_bits: usize,
    trust: Arc<dyn TrustInstaller>,
}

impl CaStore {
    /// 현재 운영체제의 신뢰 저장소 설치기를 사용합니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_bits: DEFAULT_KEY_BITS,
            trust: Arc::new(PlatformTrust::current()),
        }
    }

    /// `~/.sooproxy`
    pub fn from_home() -> Result<Self, CaError> {
        let home = dirs::home_dir().ok_or(CaError::NoHomeDir)?;
        Ok(Self::new(home.join(CA_DIR_NAME)))
    }

    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn with_trust_installer(mut self, trust: Arc<dyn TrustInstaller>) -> Self {
        self.trust = trust;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(CA_KEY_FILE)
    }

    /// 저장된 CA가 있으면 그대로 읽고, 두 파일이 모두 없을 때만 새로 생성합니다.
    ///
    /// 한쪽 파일만 있으면 손상된 것으로 보고 에러를 돌려줍니다. 자동 복구는 하지 않습니다.
    pub fn ensure_ca(&self) -> Result<CertificateAuthority, CaError> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();

        match (cert_path.exists(), key_path.exists()) {
            (true, true) => {
                debug!(dir = %self.dir.display(), "기존 CA 사용");
                self.load()
            }
            (false, false) => {
                info!(dir = %self.dir.display(), "CA가 없어 새로 생성합니다");
                self.generate_ca()
            }
            (true, false) => Err(CaError::PartialPair { present: cert_path, missing: key_path }),
            (false, true) => Err(CaError::PartialPair { present: key_path, missing: cert_path }),
        }
    }

    /// 기존 파일과 무관하게 새 CA를 만들어 저장하고 신뢰 저장소에 설치합니다.
    pub fn generate_ca(&self) -> Result<CertificateAuthority, CaError> {
        self.ensure_dir()?;

        info!(bits = self.key_bits, "CA 키 생성 중");
        let ca = CertificateAuthority::generate(self.key_bits)?;

        let cert_path = self.cert_path();
        let key_path = self.key_path();
        write_file(&cert_path, ca.cert_pem.as_bytes(), false)?;
        write_file(&key_path, ca.key_pem.as_bytes(), true)?;
        info!(cert = %cert_path.display(), key = %key_path.display(), "CA 생성 완료");

        install_trust(self.trust.as_ref(), &cert_path);
        Ok(ca)
    }

    /// 디스크의 CA 쌍을 읽고 검증합니다.
    pub fn load(&self) -> Result<CertificateAuthority, CaError> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();
        let cert_pem = fs::read_to_string(&cert_path).map_err(|e| CaError::io(&cert_path, e))?;
        let key_pem = fs::read_to_string(&key_path).map_err(|e| CaError::io(&key_path, e))?;

        CertificateAuthority::from_pem(&cert_path, cert_pem, &key_path, key_pem)
    }

    /// CA 쌍을 디스크에서 다시 읽어 `common_name`용 리프 인증서를 발급합니다.
    pub fn issue_leaf(&self, common_name: &str) -> Result<LeafCertificate, CaError> {
        self.load()?.issue_leaf(common_name)
    }

    /// 실패해도 경고만 남기고 계속 진행합니다.
    pub fn install_trust(&self) -> bool {
        install_trust(self.trust.as_ref(), &self.cert_path())
    }

    fn ensure_dir(&self) -> Result<(), CaError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| CaError::io(&self.dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| CaError::io(&self.dir, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for CaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaStore")
            .field("dir", &self.dir)
            .field("key_bits", &self.key_bits)
            .finish()
    }
}

/// 자체 서명된 CA 인증서와 RSA 개인키
#[derive(Clone)]
pub struct CertificateAuthority {
    cert_pem: String,
    /// PKCS#1 (`RSA PRIVATE KEY`)
    key_pem: String,
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
}

impl CertificateAuthority {
    fn generate(bits: usize) -> Result<Self, CaError> {
        let key_error = |e: &dyn fmt::Display| CaError::KeyGeneration(e.to_string());

        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, bits).map_err(|e| key_error(&e))?;
        let key_pem = private_key.to_pkcs1_pem(LineEnding::LF).map_err(|e| key_error(&e))?;
        let key_der = private_key.to_pkcs1_der().map_err(|e| key_error(&e))?;

        let key_pair = rcgen_key_pair(&private_key)?;
        let cert = ca_params(OffsetDateTime::now_utc()).self_signed(&key_pair)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pem.as_str().to_owned(),
            cert_der: cert.der().as_ref().to_vec(),
            key_der: key_der.as_bytes().to_vec(),
        })
    }

    fn from_pem(cert_path: &Path, cert_pem: String, key_path: &Path, key_pem: String) -> Result<Self, CaError> {
        let cert_der = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .map_err(|e| CaError::corrupt(cert_path, e))?
            .into_iter()
            .next()
            .ok_or_else(|| CaError::corrupt(cert_path, "CERTIFICATE 블록이 없습니다"))?;
        let key_der = rustls_pemfile::rsa_private_keys(&mut key_pem.as_bytes())
            .map_err(|e| CaError::corrupt(key_path, e))?
            .into_iter()
            .next()
            .ok_or_else(|| CaError::corrupt(key_path, "RSA PRIVATE KEY 블록이 없습니다"))?;

        let private_key = RsaPrivateKey::from_pkcs1_der(&key_der).map_err(|e| CaError::corrupt(key_path, e))?;
        let public_key = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .map_err(|e| CaError::corrupt(key_path, e))?;

        // 인증서의 공개키와 키 파일이 같은 쌍이어야 함
        let matches = {
            let (_, cert) = x509_parser::parse_x509_certificate(&cert_der)
                .map_err(|e| CaError::corrupt(cert_path, e))?;
            cert.public_key().raw == public_key.as_bytes()
        };
        if !matches {
            return Err(CaError::corrupt(cert_path, "인증서와 개인키가 서로 맞지 않습니다"));
        }

        Ok(Self { cert_pem, key_pem, cert_der, key_der })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// PKCS#1 DER 개인키
    pub fn key_der(&self) -> &[u8] {
        &self.key_der
    }

    pub fn issue_leaf(&self, common_name: &str) -> Result<LeafCertificate, CaError> {
        LeafCertificate::issue(self, common_name)
    }

    pub(crate) fn key_pair(&self) -> Result<KeyPair, CaError> {
        let private_key = RsaPrivateKey::from_pkcs1_der(&self.key_der)
            .map_err(|e| CaError::corrupt(CA_KEY_FILE, e))?;
        rcgen_key_pair(&private_key)
    }

    pub(crate) fn issuer(&self) -> Result<Issuer<'static, KeyPair>, CaError> {
        let der = CertificateDer::from(self.cert_der.clone());
        Issuer::from_ca_cert_der(&der, self.key_pair()?).map_err(CaError::from)
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("cert_der_len", &self.cert_der.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

fn rcgen_key_pair(private_key: &RsaPrivateKey) -> Result<KeyPair, CaError> {
    let pkcs8 = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CaError::KeyGeneration(e.to_string()))?;
    KeyPair::from_pem(&pkcs8).map_err(CaError::from)
}

fn ca_params(now: OffsetDateTime) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.use_authority_key_identifier_extension = true;
    params.serial_number = Some(SerialNumber::from(CA_SERIAL));
    params.not_before = now;
    params.not_after = add_months(now, CA_VALIDITY_MONTHS);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, CA_COMMON_NAME.to_string());
    distinguished_name.push(DnType::OrganizationName, CA_ORGANIZATION.to_string());
    params.distinguished_name = distinguished_name;
    params
}

/// 달력 기준으로 개월 수를 더합니다. 말일은 대상 월의 마지막 날로 맞춥니다.
pub(crate) fn add_months(at: OffsetDateTime, months: u32) -> OffsetDateTime {
    let zero_based = u8::from(at.month()) as u32 - 1 + months;
    let year = at.year() + (zero_based / 12) as i32;
    let month = Month::try_from((zero_based % 12 + 1) as u8).unwrap_or(Month::December);
    let day = at.day().min(month.length(year));

    Date::from_calendar_date(year, month, day)
        .map(|date| at.replace_date(date))
        .unwrap_or(at)
}

fn write_file(path: &Path, contents: &[u8], private: bool) -> Result<(), CaError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| CaError::io(path, e))?;
    file.write_all(contents).map_err(|e| CaError::io(path, e))
}

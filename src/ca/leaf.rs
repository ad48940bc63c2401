use std::net::{IpAddr, Ipv4Addr};

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
    SanType, SerialNumber,
};
use time::OffsetDateTime;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};
use tracing::info;

use super::{add_months, CaError, CertificateAuthority, CA_ORGANIZATION, LEAF_VALIDITY_MONTHS};

/// CA로 서명한 서버 인증서. 디스크에 저장하지 않습니다.
///
/// 리프 인증서는 별도 키를 만들지 않고 CA 개인키를 그대로 사용합니다.
#[derive(Clone)]
pub struct LeafCertificate {
    common_name: String,
    serial: u64,
    not_after: OffsetDateTime,
    cert_pem: String,
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
}

impl LeafCertificate {
    pub(crate) fn issue(ca: &CertificateAuthority, common_name: &str) -> Result<Self, CaError> {
        let now = OffsetDateTime::now_utc();
        let serial = now.unix_timestamp().max(0) as u64;
        let params = leaf_params(common_name, serial, now)?;
        let not_after = params.not_after;

        let key_pair = ca.key_pair()?;
        let issuer = ca.issuer()?;
        let cert = params.signed_by(&key_pair, &issuer)?;

        info!(common_name, serial, not_after = %not_after, "리프 인증서 발급");
        Ok(Self {
            common_name: common_name.to_string(),
            serial,
            not_after,
            cert_pem: cert.pem(),
            cert_der: cert.der().as_ref().to_vec(),
            key_der: ca.key_der().to_vec(),
        })
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// 체인에는 리프 인증서만 넣습니다. CA는 클라이언트 신뢰 저장소에 있어야 합니다.
    pub fn server_config(&self) -> Result<ServerConfig, CaError> {
        let mut config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(
                vec![Certificate(self.cert_der.clone())],
                PrivateKey(self.key_der.clone()),
            )?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }
}

impl std::fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("common_name", &self.common_name)
            .field("serial", &self.serial)
            .field("not_after", &self.not_after)
            .finish()
    }
}

fn leaf_params(common_name: &str, serial: u64, now: OffsetDateTime) -> Result<CertificateParams, CaError> {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::ExplicitNoCa;
    params.use_authority_key_identifier_extension = true;
    params.serial_number = Some(SerialNumber::from(serial));
    params.not_before = now;
    params.not_after = add_months(now, LEAF_VALIDITY_MONTHS);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name.to_string());
    distinguished_name.push(DnType::OrganizationName, CA_ORGANIZATION.to_string());
    params.distinguished_name = distinguished_name;

    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    match common_name.parse::<IpAddr>() {
        Ok(ip) => {
            params.subject_alt_names.push(SanType::IpAddress(ip));
            if ip != loopback {
                params.subject_alt_names.push(SanType::IpAddress(loopback));
            }
        }
        Err(_) => {
            params.subject_alt_names.push(SanType::DnsName(common_name.try_into()?));
            params.subject_alt_names.push(SanType::IpAddress(loopback));
        }
    }

    Ok(params)
}

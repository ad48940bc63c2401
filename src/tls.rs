use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::ca::{CaError, CaStore, LeafCertificate};

/// HTTPS 리스너가 사용하는 TLS 설정
#[derive(Clone)]
pub struct TlsConfig {
    pub acceptor: TlsAcceptor,
    pub leaf: LeafCertificate,
}

impl TlsConfig {
    pub fn from_leaf(leaf: LeafCertificate) -> Result<Self, CaError> {
        let server_config = leaf.server_config()?;
        let acceptor = TlsAcceptor::from(Arc::new(server_config));
        Ok(Self { acceptor, leaf })
    }

    /// CA를 준비하고(`ensure_ca`) `host`용 리프 인증서를 발급합니다.
    ///
    /// 키 생성은 오래 걸릴 수 있으므로 블로킹 스레드에서 실행합니다.
    pub async fn issue(store: CaStore, host: String) -> Result<Self, CaError> {
        let leaf = tokio::task::spawn_blocking(move || {
            store.ensure_ca()?.issue_leaf(&host)
        })
        .await
        .map_err(|e| CaError::KeyGeneration(format!("인증서 발급 작업 실패: {}", e)))??;

        info!(
            common_name = %leaf.common_name(),
            not_after = %leaf.not_after(),
            "TLS 설정 완료"
        );
        Self::from_leaf(leaf)
    }
}

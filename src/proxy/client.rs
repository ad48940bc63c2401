use hyper::{Request, Response};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::warn;

use super::ProxyError;

/// 모든 라우트가 공유하는 업스트림 클라이언트. 커넥션 풀을 재사용합니다.
#[derive(Clone)]
pub struct ProxyClient {
    client: legacy::Client<HttpsConnector<HttpConnector>, Incoming>,
}

impl ProxyClient {
    pub fn new() -> Self {
        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!(error = %e, "OS 루트 인증서를 불러오지 못해 내장 루트 인증서를 사용합니다");
                HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let connector = builder
            .https_or_http()
            .enable_http1()
            .build();
        let client = legacy::Client::builder(TokioExecutor::new())
            .build::<_, Incoming>(connector);

        Self { client }
    }

    pub async fn forward(&self, req: Request<Incoming>) -> Result<Response<Incoming>, ProxyError> {
        self.client.request(req).await.map_err(ProxyError::Upstream)
    }
}

impl Default for ProxyClient {
    fn default() -> Self {
        Self::new()
    }
}

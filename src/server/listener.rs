use std::net::SocketAddr;
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::error::Error;
use super::handler::RequestHandler;
use super::Result;

/// 단일 주소에서 HTTP/1.1 또는 HTTPS 연결을 받습니다.
pub struct ServerListener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl ServerListener {
    pub async fn bind(addr: &str, tls: Option<TlsAcceptor>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(error = %e, addr = %addr, "포트 바인딩 실패");
            Error::Bind { addr: addr.to_string(), source: e }
        })?;

        info!(
            addr = %listener.local_addr()?,
            tls = tls.is_some(),
            "리스너 시작"
        );
        Ok(Self { listener, tls })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// 연결마다 태스크를 하나씩 띄웁니다. 연결 단위 에러는 로그만 남깁니다.
    pub async fn run(self, handler: Arc<RequestHandler>) -> Result<()> {
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "연결 수락 실패");
                    continue;
                }
            };

            let handler = handler.clone();
            let tls = self.tls.clone();
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let io = TokioIo::new(tls_stream);
                            if let Err(err) = handler.handle_connection(io, remote).await {
                                debug!(error = %err, remote = %remote, "HTTPS 연결 처리 실패");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, remote = %remote, "TLS 핸드쉐이크 실패");
                        }
                    },
                    None => {
                        let io = TokioIo::new(stream);
                        if let Err(err) = handler.handle_connection(io, remote).await {
                            debug!(error = %err, remote = %remote, "HTTP 연결 처리 실패");
                        }
                    }
                }
            });
        }
    }
}

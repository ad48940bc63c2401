#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sooproxy::ca::{CaError, CaStore, TrustInstaller};
use sooproxy::server::ServerManager;
use sooproxy::settings::{Overrides, ProxySpec, Settings};

pub const TEST_KEY_BITS: usize = 2048;

/// 신뢰 저장소를 건드리지 않고 호출 횟수만 셉니다.
#[derive(Default)]
pub struct CountingTrust {
    pub calls: AtomicUsize,
}

impl CountingTrust {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustInstaller for CountingTrust {
    fn install(&self, _cert_path: &Path) -> Result<(), CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn test_store(dir: &Path) -> (CaStore, Arc<CountingTrust>) {
    let trust = Arc::new(CountingTrust::default());
    let store = CaStore::new(dir.join("ca"))
        .with_key_bits(TEST_KEY_BITS)
        .with_trust_installer(trust.clone());
    (store, trust)
}

/// `{name} {method} {uri} host={host} xff={x-forwarded-for}` 를 돌려주는 업스트림
pub async fn spawn_upstream(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    let header = |key: &str| {
                        req.headers()
                            .get(key)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string()
                    };
                    let body = format!(
                        "{} {} {} host={} xff={}",
                        name,
                        req.method(),
                        req.uri(),
                        header("host"),
                        header("x-forwarded-for"),
                    );
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// `Upgrade` 요청에 101로 답한 뒤, 업그레이드된 연결에서 받은 4바이트를 그대로 돌려주는 업스트림.
/// 응답의 `x-upstream-path` 헤더로 전달받은 경로를 알려줍니다.
pub async fn spawn_upgrade_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(|mut req: Request<Incoming>| async move {
                    let path = req.uri().path().to_string();
                    let protocol = req
                        .headers()
                        .get("upgrade")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let Some(protocol) = protocol else {
                        return Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("no upgrade"))));
                    };

                    let on_upgrade = hyper::upgrade::on(&mut req);
                    tokio::spawn(async move {
                        let mut io = TokioIo::new(on_upgrade.await.unwrap());
                        let mut buf = [0u8; 4];
                        io.read_exact(&mut buf).await.unwrap();
                        io.write_all(&buf).await.unwrap();
                        io.flush().await.unwrap();
                    });

                    let response = Response::builder()
                        .status(StatusCode::SWITCHING_PROTOCOLS)
                        .header("connection", "upgrade")
                        .header("upgrade", protocol)
                        .header("x-upstream-path", path)
                        .body(Full::new(Bytes::new()))
                        .unwrap();
                    Ok(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await;
            });
        }
    });

    addr
}

pub fn upstream_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

/// 임의 포트의 127.0.0.1에 리슨하는 설정
pub fn local_settings(proxies: Vec<ProxySpec>) -> Settings {
    Settings {
        name: None,
        host: "127.0.0.1".to_string(),
        port: 0,
        secure: false,
        config_file: None,
        proxies,
    }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub routes: sooproxy::server::SharedRoutes,
    pub reload: tokio::sync::mpsc::Sender<Settings>,
    pub generation: Arc<std::sync::atomic::AtomicU64>,
    pub ca_cert_pem: Option<String>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_server(settings: Settings, overrides: Overrides, store: CaStore) -> RunningServer {
    let cert_path = store.cert_path();
    let manager = ServerManager::bind(settings, overrides, store).await.unwrap();
    let ca_cert_pem = manager
        .tls()
        .map(|_| std::fs::read_to_string(&cert_path).unwrap());

    RunningServer {
        addr: manager.local_addr().unwrap(),
        routes: manager.routes(),
        reload: manager.reload_sender(),
        generation: manager.generation(),
        ca_cert_pem,
        handle: tokio::spawn(async move {
            let _ = manager.run().await;
        }),
    }
}

pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

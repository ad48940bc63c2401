use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::ca::CaStore;
use crate::proxy::ProxyClient;
use crate::routing::RouteTable;
use crate::settings::watcher::ConfigWatcher;
use crate::settings::{Overrides, Settings};
use crate::tls::TlsConfig;
use super::{
    handler::RequestHandler,
    listener::ServerListener,
    reload::{shared_routes, watch_config, ReloadCoordinator, SharedRoutes},
    Result,
};

/// 초기 라우팅 테이블, TLS, 리스너를 준비하고 리로드 파이프라인을 묶어 실행합니다.
pub struct ServerManager {
    settings: Settings,
    overrides: Overrides,
    routes: SharedRoutes,
    listener: ServerListener,
    tls: Option<TlsConfig>,
    reload: ReloadCoordinator,
    reload_tx: mpsc::Sender<Settings>,
    reload_rx: mpsc::Receiver<Settings>,
}

impl ServerManager {
    /// 여기서 실패하는 경우(잘못된 업스트림, CA 문제, 바인딩 실패)는 모두 치명적입니다.
    pub async fn bind(settings: Settings, overrides: Overrides, ca_store: CaStore) -> Result<Self> {
        if let Some(name) = &settings.name {
            info!(name = %name, "서버 설정 로드");
        }

        let table = RouteTable::build(&settings.proxies).map_err(|e| {
            error!(error = %e, "라우팅 테이블 구성 실패");
            e
        })?;
        info!(routes = table.len(), catch_all = table.has_catch_all(), "초기 라우팅 테이블 준비");
        let routes = shared_routes(table);

        let tls = if settings.secure {
            Some(TlsConfig::issue(ca_store, settings.host.clone()).await.map_err(|e| {
                error!(error = %e, "TLS 준비 실패");
                e
            })?)
        } else {
            None
        };

        let listener = ServerListener::bind(
            &settings.listen_addr(),
            tls.as_ref().map(|t| t.acceptor.clone()),
        )
        .await?;

        let (reload_tx, reload_rx) = mpsc::channel(1);
        let reload = ReloadCoordinator::new(routes.clone(), settings.clone());

        Ok(Self {
            settings,
            overrides,
            routes,
            listener,
            tls,
            reload,
            reload_tx,
            reload_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn routes(&self) -> SharedRoutes {
        self.routes.clone()
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// 리로드 루프로 직접 설정을 보낼 수 있는 송신자
    pub fn reload_sender(&self) -> mpsc::Sender<Settings> {
        self.reload_tx.clone()
    }

    pub fn generation(&self) -> Arc<AtomicU64> {
        self.reload.generation_handle()
    }

    fn start_watcher(path: &Path) -> crate::settings::Result<ConfigWatcher> {
        let mut watcher = ConfigWatcher::new();
        watcher.add_path(path)?;
        watcher.start()?;
        Ok(watcher)
    }

    /// 서버 실행. 정상적으로는 반환하지 않습니다.
    pub async fn run(self) -> Result<()> {
        if self.settings.config_file.is_some() {
            match Self::start_watcher(&self.overrides.config_file) {
                Ok(watcher) => {
                    tokio::spawn(watch_config(watcher, self.overrides.clone(), self.reload_tx.clone()));
                }
                Err(e) => warn!(error = %e, "설정 파일 감시를 시작하지 못해 핫 리로드가 비활성화됩니다"),
            }
        }

        tokio::spawn(self.reload.run(self.reload_rx));

        let handler = Arc::new(RequestHandler::new(self.routes, ProxyClient::new()));
        info!(
            addr = %self.settings.listen_addr(),
            secure = self.settings.secure,
            "SooProxy 시작"
        );
        self.listener.run(handler).await
    }
}

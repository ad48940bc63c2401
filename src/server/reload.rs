//! 설정 파일 변경을 라우팅 테이블 교체로 이어 주는 부분입니다.
//!
//! 감시 태스크가 새 `Settings`를 만들어 단일 슬롯 채널로 보내면,
//! 리로드 루프가 테이블을 새로 만들어 `ArcSwap`으로 한 번에 바꿔 끼웁니다.
//! 처리 중인 요청은 시작할 때 읽은 테이블을 끝까지 사용합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::routing::{RouteTable, RoutingError};
use crate::settings::watcher::{ConfigEvent, ConfigWatcher};
use crate::settings::{FileConfig, Overrides, Settings};

/// 한 번의 저장으로 여러 이벤트가 올 때 묶어서 처리하는 대기 시간
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

pub type SharedRoutes = Arc<ArcSwap<RouteTable>>;

pub fn shared_routes(table: RouteTable) -> SharedRoutes {
    Arc::new(ArcSwap::from_pointee(table))
}

/// 리로드는 이 코디네이터 하나가 순서대로 적용합니다.
pub struct ReloadCoordinator {
    routes: SharedRoutes,
    current: Settings,
    generation: Arc<AtomicU64>,
}

impl ReloadCoordinator {
    pub fn new(routes: SharedRoutes, current: Settings) -> Self {
        Self {
            routes,
            current,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 지금까지 성공한 리로드 횟수
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn generation_handle(&self) -> Arc<AtomicU64> {
        self.generation.clone()
    }

    /// 새 테이블을 만들어 교체합니다. 실패하면 기존 테이블이 그대로 유지됩니다.
    pub fn apply(&mut self, settings: Settings) -> Result<u64, RoutingError> {
        let table = RouteTable::build(&settings.proxies)?;

        if self.current.listener_differs(&settings) {
            warn!(
                host = %settings.host,
                port = settings.port,
                secure = settings.secure,
                "리스너 설정 변경은 재시작 후에 반영됩니다"
            );
        }

        let count = table.len();
        self.routes.store(Arc::new(table));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, routes = count, "라우팅 테이블 교체 완료");

        self.current = settings;
        Ok(generation)
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Settings>) {
        while let Some(settings) = rx.recv().await {
            if let Err(e) = self.apply(settings) {
                error!(error = %e, "새 설정으로 라우팅 테이블을 만들지 못해 기존 테이블을 유지합니다");
            }
        }
        debug!("리로드 채널이 닫혀 리로드 루프를 종료합니다");
    }
}

/// 파일 변경 이벤트마다 설정을 다시 읽어 CLI 값과 병합한 뒤 `tx`로 보냅니다.
///
/// 파싱에 실패한 내용은 보내지 않으므로 직전 테이블이 유지됩니다.
pub async fn watch_config(mut watcher: ConfigWatcher, overrides: Overrides, tx: mpsc::Sender<Settings>) {
    let path = overrides.config_file.clone();
    info!(path = %path.display(), "설정 파일 감시 시작");

    while let Some(events) = watcher.watch_debounced(RELOAD_DEBOUNCE).await {
        debug!(count = events.len(), "설정 파일 이벤트 수신");
        if !events.iter().any(ConfigEvent::is_write) {
            warn!(path = %path.display(), "설정 파일이 삭제되었습니다. 현재 라우트를 유지합니다");
            continue;
        }

        let file = match FileConfig::read(&path).await {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "설정 파일을 다시 읽지 못해 현재 라우트를 유지합니다");
                continue;
            }
        };

        let settings = Settings::merge(&overrides, Some(file));
        if tx.send(settings).await.is_err() {
            break;
        }
    }

    debug!("설정 파일 감시 종료");
}

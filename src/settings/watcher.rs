use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher, Event, Result as NotifyResult};
use crate::settings::{Result, SettingsError};
use tracing::{debug, error};

/// 설정 파일 변경 이벤트 타입
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigEvent {
    /// 파일이 수정됨
    Modified(PathBuf),
    /// 파일이 생성됨 (rename 방식으로 저장하는 편집기 포함)
    Created(PathBuf),
    /// 파일이 삭제됨
    Deleted(PathBuf),
}

impl ConfigEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified(p) | Self::Created(p) | Self::Deleted(p) => p,
        }
    }

    /// 내용을 다시 읽어야 하는 이벤트인지 여부
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Modified(_) | Self::Created(_))
    }
}

/// 설정 파일 감시자
///
/// 파일 자체가 아니라 상위 디렉터리를 감시하고 파일 이름으로 걸러냅니다.
/// 원자적 rename으로 저장하는 편집기를 써도 감시가 끊기지 않습니다.
pub struct ConfigWatcher {
    /// (감시 디렉터리, 파일 이름) 목록
    targets: Vec<(PathBuf, OsString)>,
    event_tx: mpsc::Sender<ConfigEvent>,
    event_rx: mpsc::Receiver<ConfigEvent>,
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            targets: Vec::new(),
            event_tx,
            event_rx,
            watcher: None,
        }
    }

    /// 감시할 파일 추가
    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file_name = path.file_name()
            .ok_or_else(|| SettingsError::WatchError(format!("파일 경로가 아님: {}", path.display())))?
            .to_os_string();

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let parent = parent.canonicalize().map_err(|e| {
            SettingsError::WatchError(format!("{}: {}", parent.display(), e))
        })?;

        self.targets.push((parent, file_name));
        Ok(())
    }

    /// 테스트용 이벤트 송신자 반환
    #[cfg(test)]
    pub fn get_sender(&self) -> mpsc::Sender<ConfigEvent> {
        self.event_tx.clone()
    }

    /// 감시 시작
    pub fn start(&mut self) -> Result<()> {
        let event_tx = self.event_tx.clone();
        let names: Vec<OsString> = self.targets.iter().map(|(_, name)| name.clone()).collect();

        // notify 콜백은 별도 스레드에서 호출되므로 blocking_send를 사용
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: NotifyResult<Event>| {
            match res {
                Ok(event) => {
                    use notify::EventKind::*;

                    for path in event.paths {
                        let watched = path.file_name().map_or(false, |n| names.iter().any(|t| t == n));
                        if !watched {
                            continue;
                        }
                        let config_event = match event.kind {
                            Modify(_) => ConfigEvent::Modified(path),
                            Create(_) => ConfigEvent::Created(path),
                            Remove(_) => ConfigEvent::Deleted(path),
                            _ => continue,
                        };
                        debug!(event = ?config_event, "설정 파일 이벤트");
                        let _ = event_tx.blocking_send(config_event);
                    }
                }
                Err(e) => error!(error = %e, "감시 오류"),
            }
        }).map_err(|e| SettingsError::WatchError(e.to_string()))?;

        for (dir, _) in &self.targets {
            debug!("경로 감시 시작: {}", dir.display());
            watcher.watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| SettingsError::WatchError(e.to_string()))?;
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    /// 이벤트 수신 대기
    pub async fn watch(&mut self) -> Option<ConfigEvent> {
        self.event_rx.recv().await
    }

    /// 첫 이벤트 이후 `quiet` 동안 추가 이벤트가 없을 때까지 모아서 반환합니다.
    /// 한 번의 저장이 여러 개의 수정 이벤트를 만드는 경우를 하나로 묶습니다.
    pub async fn watch_debounced(&mut self, quiet: Duration) -> Option<Vec<ConfigEvent>> {
        let first = self.event_rx.recv().await?;
        let mut events = vec![first];

        while let Ok(Some(event)) = tokio::time::timeout(quiet, self.event_rx.recv()).await {
            events.push(event);
        }

        Some(events)
    }
}

impl Default for ConfigWatcher {
    fn default() -> Self {
        Self::new()
    }
}

use std::{env, fs, path::{Path, PathBuf}, str::FromStr};
use serde::Deserialize;
use tracing::{debug, info, warn};

pub mod logging;
pub mod watcher;
mod error;

pub use error::SettingsError;
pub use logging::{LogFormat, LogOutput, LogSettings};

pub type Result<T> = std::result::Result<T, SettingsError>;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// 이 포트로 리슨하면 TLS가 강제로 활성화됩니다.
pub const HTTPS_PORT: u16 = 443;

/// 설정 파일 또는 CLI에서 들어온 프록시 한 건입니다.
///
/// `host`는 업스트림 URL(스킴 + 호스트)이고 `prefix`는 아직 정규화되지 않은 값입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProxySpec {
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub prefix: String,
}

impl ProxySpec {
    pub fn new(prefix: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            host: host.into(),
            prefix: prefix.into(),
        }
    }
}

impl FromStr for ProxySpec {
    type Err = SettingsError;

    /// `PREFIX::TARGET` 형식을 파싱합니다. 구분자는 첫 번째 `::` 입니다.
    fn from_str(s: &str) -> Result<Self> {
        let (prefix, target) = s.split_once("::").ok_or_else(|| SettingsError::InvalidProxySpec {
            value: s.to_string(),
            reason: "'::' 구분자가 없습니다".to_string(),
        })?;

        if target.trim().is_empty() {
            return Err(SettingsError::InvalidProxySpec {
                value: s.to_string(),
                reason: "대상 업스트림이 비어 있습니다".to_string(),
            });
        }

        Ok(Self::new(prefix.trim(), target.trim()))
    }
}

/// 설정 파일의 원본 형태. 비어 있는 값은 "지정되지 않음"으로 취급합니다.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub proxies: Vec<ProxySpec>,
}

impl FileConfig {
    /// 확장자가 `.toml`이면 TOML로, 그 외에는 YAML로 파싱합니다.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let content = fs::read_to_string(path).map_err(|e| SettingsError::FileError {
            path: display,
            error: e,
        })?;
        Self::parse(path, &content)
    }

    /// 비동기 런타임 안에서 다시 읽을 때 사용합니다.
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| SettingsError::FileError {
            path: path.to_string_lossy().to_string(),
            error: e,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let display = path.to_string_lossy().to_string();
        if path.extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(content).map_err(|e| SettingsError::TomlError { path: display, source: e })
        } else if content.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(content).map_err(|e| SettingsError::ParseError { path: display, source: e })
        }
    }
}

/// 커맨드라인에서 명시적으로 지정된 값들. 파일 값보다 항상 우선합니다.
#[derive(Debug, Clone)]
pub struct Overrides {
    pub config_file: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: bool,
    pub proxies: Vec<ProxySpec>,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            host: None,
            port: None,
            secure: false,
            proxies: Vec::new(),
        }
    }
}

/// 코어에 전달되는 불변 설정 스냅샷입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// 설정 파일을 실제로 읽은 경우에만 채워지며, 이 경로가 감시 대상이 됩니다.
    pub config_file: Option<PathBuf>,
    pub proxies: Vec<ProxySpec>,
}

impl Settings {
    /// CLI 값과 (있다면) 설정 파일을 병합합니다.
    ///
    /// 설정 파일이 존재하지만 파싱에 실패하면 빈 설정으로 간주하고 계속 진행합니다.
    pub fn load(overrides: &Overrides) -> Self {
        let path = &overrides.config_file;
        let file = if path.is_file() {
            info!(path = %path.display(), "설정 파일 로드");
            match FileConfig::from_file(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(error = %e, "설정 파일을 읽을 수 없어 빈 설정으로 대체합니다");
                    Some(FileConfig::default())
                }
            }
        } else {
            debug!(path = %path.display(), "설정 파일 없음, CLI 값만 사용");
            None
        };

        Self::merge(overrides, file)
    }

    /// 우선순위 규칙: 비어 있지 않은 CLI 값 > 파일 값 > 기본값.
    /// CLI 프록시가 먼저 오고 파일 프록시가 뒤에 붙습니다.
    pub fn merge(overrides: &Overrides, file: Option<FileConfig>) -> Self {
        let config_file = file.as_ref().map(|_| overrides.config_file.clone());
        let file = file.unwrap_or_default();

        let host = non_empty(overrides.host.clone())
            .or_else(|| non_empty(file.host))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = overrides.port.filter(|p| *p != 0)
            .or(file.port.filter(|p| *p != 0))
            .unwrap_or(DEFAULT_PORT);

        let secure = overrides.secure || file.secure || port == HTTPS_PORT;

        let mut proxies = overrides.proxies.clone();
        proxies.extend(file.proxies);

        Self {
            name: non_empty(file.name),
            host,
            port,
            secure,
            config_file,
            proxies,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 재시작 없이는 반영되지 않는 값(리스너 관련)이 다른지 확인합니다.
    pub fn listener_differs(&self, other: &Settings) -> bool {
        self.host != other.host || self.port != other.port || self.secure != other.secure
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn parse_env_var<T: FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

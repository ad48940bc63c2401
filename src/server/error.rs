use std::fmt;

use crate::ca::CaError;
use crate::routing::RoutingError;
use crate::settings::SettingsError;

/// 서버 기동 중 발생하는 치명적 에러
#[derive(Debug)]
pub enum Error {
    /// 리스너 바인딩 실패
    Bind {
        addr: String,
        source: std::io::Error,
    },
    IoError(std::io::Error),
    RoutingError(RoutingError),
    CaError(CaError),
    ConfigError(SettingsError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<RoutingError> for Error {
    fn from(err: RoutingError) -> Self {
        Error::RoutingError(err)
    }
}

impl From<CaError> for Error {
    fn from(err: CaError) -> Self {
        Error::CaError(err)
    }
}

impl From<SettingsError> for Error {
    fn from(err: SettingsError) -> Self {
        Error::ConfigError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "{} 바인딩 실패: {}", addr, source),
            Error::IoError(e) => write!(f, "IO Error: {}", e),
            Error::RoutingError(e) => write!(f, "Routing Error: {}", e),
            Error::CaError(e) => write!(f, "CA Error: {}", e),
            Error::ConfigError(e) => write!(f, "Config Error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::IoError(e) => Some(e),
            Error::RoutingError(e) => Some(e),
            Error::CaError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
        }
    }
}

use std::fmt;

#[derive(Debug)]
pub enum SettingsError {
    EnvVarInvalid {
        var_name: String,
        value: String,
        reason: String,
    },
    FileError {
        path: String,
        error: std::io::Error,
    },
    ParseError {
        path: String,
        source: serde_yaml::Error,
    },
    TomlError {
        path: String,
        source: toml::de::Error,
    },
    InvalidProxySpec {
        value: String,
        reason: String,
    },
    WatchError(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarInvalid { var_name, value, reason } =>
                write!(f, "환경 변수 {} 값 {} 오류: {}", var_name, value, reason),
            Self::FileError { path, error } =>
                write!(f, "설정 파일 {} 오류: {}", path, error),
            Self::ParseError { path, source } =>
                write!(f, "설정 파일 {} 파싱 오류: {}", path, source),
            Self::TomlError { path, source } =>
                write!(f, "설정 파일 {} 파싱 오류: {}", path, source),
            Self::InvalidProxySpec { value, reason } =>
                write!(f, "잘못된 프록시 지정 '{}': {} (형식: PREFIX::TARGET)", value, reason),
            Self::WatchError(msg) =>
                write!(f, "설정 파일 감시 오류: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError { source, .. } => Some(source),
            Self::TomlError { source, .. } => Some(source),
            Self::FileError { error, .. } => Some(error),
            _ => None,
        }
    }
}

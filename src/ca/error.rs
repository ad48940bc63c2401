use std::fmt;
use std::path::PathBuf;

const REGENERATE_HINT: &str =
    "ca.pem과 ca.key를 삭제하면 다음 실행 시 새 CA가 자동으로 생성됩니다";

#[derive(Debug)]
pub enum CaError {
    /// 홈 디렉터리를 찾을 수 없음
    NoHomeDir,
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 키 생성 또는 인코딩 실패
    KeyGeneration(String),
    /// 인증서 생성/서명 실패
    Certificate(rcgen::Error),
    /// 파일 중 하나만 존재하는 불완전한 CA 쌍
    PartialPair {
        present: PathBuf,
        missing: PathBuf,
    },
    /// PEM/X.509/키 파싱 실패
    Corrupt {
        path: PathBuf,
        reason: String,
    },
    Tls(tokio_rustls::rustls::Error),
    /// OS 신뢰 저장소 설치 실패
    Trust {
        command: String,
        reason: String,
    },
}

impl CaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaError::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        CaError::Corrupt { path: path.into(), reason: reason.to_string() }
    }
}

impl fmt::Display for CaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaError::NoHomeDir => write!(f, "홈 디렉터리를 찾을 수 없습니다"),
            CaError::Io { path, source } =>
                write!(f, "{} 처리 실패: {} ({})", path.display(), source, REGENERATE_HINT),
            CaError::KeyGeneration(msg) => write!(f, "CA 키 생성 실패: {}", msg),
            CaError::Certificate(e) => write!(f, "인증서 생성 실패: {}", e),
            CaError::PartialPair { present, missing } => write!(
                f,
                "CA 파일 쌍이 불완전합니다: {}는 있지만 {}가 없습니다 ({})",
                present.display(),
                missing.display(),
                REGENERATE_HINT
            ),
            CaError::Corrupt { path, reason } =>
                write!(f, "{} 파일이 손상되었습니다: {} ({})", path.display(), reason, REGENERATE_HINT),
            CaError::Tls(e) => write!(f, "TLS 설정 생성 실패: {}", e),
            CaError::Trust { command, reason } =>
                write!(f, "신뢰 저장소 명령 '{}' 실패: {}", command, reason),
        }
    }
}

impl std::error::Error for CaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaError::Io { source, .. } => Some(source),
            CaError::Certificate(e) => Some(e),
            CaError::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rcgen::Error> for CaError {
    fn from(err: rcgen::Error) -> Self {
        CaError::Certificate(err)
    }
}

impl From<tokio_rustls::rustls::Error> for CaError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        CaError::Tls(err)
    }
}

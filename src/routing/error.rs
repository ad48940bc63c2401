use std::fmt;

/// 라우팅 테이블 구성 중 발생하는 에러입니다.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingError {
    /// 업스트림 URL을 라우팅 대상으로 사용할 수 없음
    InvalidUpstream {
        prefix: String,
        upstream: String,
        reason: String,
    },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::InvalidUpstream { prefix, upstream, reason } =>
                write!(f, "prefix {}의 업스트림 {}이(가) 유효하지 않음: {}", prefix, upstream, reason),
        }
    }
}

impl std::error::Error for RoutingError {}

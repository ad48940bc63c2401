use std::fmt;
use hyper::header::InvalidHeaderValue;

#[derive(Debug)]
pub enum ProxyError {
    /// 재작성된 요청을 만들 수 없음
    Request(hyper::http::Error),
    Header(InvalidHeaderValue),
    /// 업스트림 연결/응답 실패
    Upstream(hyper_util::client::legacy::Error),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Request(e) => write!(f, "요청 재작성 실패: {}", e),
            ProxyError::Header(e) => write!(f, "잘못된 헤더 값: {}", e),
            ProxyError::Upstream(e) => write!(f, "업스트림 요청 실패: {}", e),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Request(e) => Some(e),
            ProxyError::Header(e) => Some(e),
            ProxyError::Upstream(e) => Some(e),
        }
    }
}

use std::net::IpAddr;
use hyper::header::{HeaderMap, HeaderValue, CONNECTION, HOST, UPGRADE};
use hyper::http::uri::{Authority, Scheme};
use hyper::{Request, Uri};
use url::Url;

use crate::proxy::ProxyError;
use crate::routing::RoutingError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// 다음 홉으로 전달하면 안 되는 헤더들
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// 하나의 prefix에 묶인 요청 재작성 규칙입니다.
///
/// 생성 후에는 읽기 전용이므로 여러 요청이 동시에 공유해도 됩니다.
#[derive(Debug, Clone)]
pub struct Director {
    prefix: String,
    upstream: Url,
    scheme: Scheme,
    authority: Authority,
}

impl Director {
    /// 업스트림 URL을 파싱합니다. `http`/`https` 스킴과 호스트가 반드시 있어야 합니다.
    pub fn new(prefix: &str, upstream: &str) -> Result<Self, RoutingError> {
        let invalid = |reason: String| RoutingError::InvalidUpstream {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            reason,
        };

        let url = Url::parse(upstream).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(invalid(format!("지원하지 않는 스킴: {}", other))),
        };
        let host = url.host_str().ok_or_else(|| invalid("호스트가 없습니다".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = authority.parse::<Authority>().map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            upstream: url,
            scheme,
            authority,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// prefix를 떼어낸 나머지 경로. 항상 `/`로 시작합니다.
    pub fn rewrite_path(&self, path: &str) -> String {
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }

    /// 스킴과 authority를 업스트림으로 바꾸고 쿼리 문자열은 유지합니다.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let path = self.rewrite_path(uri.path());
        let path_and_query = match uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(ProxyError::Request)
    }

    /// 업스트림으로 보낼 요청을 만듭니다. 본문은 그대로 흘려보냅니다.
    pub fn rewrite<B>(&self, req: Request<B>, client_ip: Option<IpAddr>) -> Result<Request<B>, ProxyError> {
        let (mut parts, body) = req.into_parts();
        parts.uri = self.rewrite_uri(&parts.uri)?;

        let upgrade = upgrade_protocol(&parts.headers);
        remove_hop_headers(&mut parts.headers);
        if let Some(protocol) = upgrade {
            restore_upgrade(&mut parts.headers, protocol);
        }
        let host = HeaderValue::from_str(self.authority.as_str()).map_err(ProxyError::Header)?;
        parts.headers.insert(HOST, host);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut parts.headers, ip);
        }

        Ok(Request::from_parts(parts, body))
    }
}

/// hop-by-hop 헤더와 `Connection`에 나열된 헤더를 제거합니다.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// `Connection: upgrade`와 함께 온 `Upgrade` 헤더 값. 없으면 일반 요청입니다.
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let requested = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    if requested {
        headers.get(UPGRADE).cloned()
    } else {
        None
    }
}

/// hop-by-hop 헤더를 지운 뒤 업그레이드 협상에 필요한 두 헤더만 다시 넣습니다.
pub fn restore_upgrade(headers: &mut HeaderMap, protocol: HeaderValue) {
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, protocol);
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

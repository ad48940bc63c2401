use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::proxy::Director;
use crate::routing::RoutingError;
use crate::settings::ProxySpec;

/// prefix가 항상 `/`로 시작하고 `/`로 끝나도록 정규화합니다.
pub fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim();
    let mut normalized = String::with_capacity(prefix.len() + 2);
    if !prefix.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(prefix);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// `.`/`..` 세그먼트와 중복된 `/`를 정리한 경로. 원래 경로가 `/`로 끝나면 유지합니다.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    if path.ends_with('/') && cleaned != "/" {
        cleaned.push('/');
    }
    cleaned
}

/// 테이블에 등록된 라우트 하나. 정규화된 prefix와 요청 재작성 규칙을 가집니다.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub name: String,
    upstream: String,
    director: Director,
}

impl ProxyRoute {
    pub fn prefix(&self) -> &str {
        self.director.prefix()
    }

    /// 설정에 적힌 그대로의 업스트림 문자열
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn director(&self) -> &Director {
        &self.director
    }
}

/// 요청 경로에 대한 라우팅 결과
#[derive(Debug)]
pub enum Dispatch<'a> {
    Proxy(&'a ProxyRoute),
    /// 정리되지 않은 경로이거나 끝 `/`만 빠진 경로. 값은 리다이렉트할 경로입니다.
    Redirect(String),
    /// 매칭되는 라우트도 catch-all도 없음
    Lost,
}

/// 한 번의 설정 로드로 만들어지는 불변 라우팅 테이블입니다.
///
/// 리로드 시에는 수정하지 않고 새 테이블을 통째로 만들어 교체합니다.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ProxyRoute>,
    has_catch_all: bool,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 입력 순서대로 라우트를 등록합니다. 같은 prefix는 먼저 등록된 것이 이깁니다.
    ///
    /// 업스트림 URL이 잘못된 라우트가 하나라도 있으면 테이블 전체가 실패합니다.
    pub fn build(specs: &[ProxySpec]) -> Result<Self, RoutingError> {
        debug!(count = specs.len(), "라우트 구성 시작");
        let mut table = Self::new();
        let mut accepted = HashSet::new();

        for spec in specs {
            let prefix = normalize_prefix(&spec.prefix);
            if accepted.contains(&prefix) {
                warn!(
                    prefix = %prefix,
                    upstream = %spec.host,
                    "이미 사용 중인 prefix이므로 건너뜁니다"
                );
                continue;
            }

            let director = Director::new(&prefix, &spec.host)?;
            info!(prefix = %prefix, upstream = %spec.host, "라우트 등록");

            accepted.insert(prefix.clone());
            table.routes.push(ProxyRoute {
                name: if spec.name.is_empty() { prefix } else { spec.name.clone() },
                upstream: spec.host.clone(),
                director,
            });
        }

        table.has_catch_all = accepted.contains("/");
        if table.has_catch_all {
            info!("catch-all 라우트(/)가 있어 기본 페이지를 설치하지 않습니다");
        } else {
            debug!("catch-all 라우트가 없어 기본 페이지를 / 에 설치합니다");
        }

        Ok(table)
    }

    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn has_catch_all(&self) -> bool {
        self.has_catch_all
    }

    /// 정규화된 prefix로 라우트를 찾습니다.
    pub fn get(&self, prefix: &str) -> Option<&ProxyRoute> {
        self.routes.iter().find(|r| r.prefix() == prefix)
    }

    /// 요청 경로를 라우트에 매칭합니다. 가장 긴 prefix가 우선합니다.
    ///
    /// 정리되지 않은 경로는 매칭하지 않고 정리된 경로로 리다이렉트합니다.
    pub fn dispatch(&self, path: &str) -> Dispatch<'_> {
        let cleaned = clean_path(path);
        if cleaned != path {
            return Dispatch::Redirect(cleaned);
        }

        if !path.ends_with('/') {
            let with_slash = format!("{}/", path);
            if self.get(&with_slash).is_some() {
                return Dispatch::Redirect(with_slash);
            }
        }

        self.routes
            .iter()
            .filter(|r| path.starts_with(r.prefix()))
            .max_by_key(|r| r.prefix().len())
            .map(Dispatch::Proxy)
            .unwrap_or(Dispatch::Lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        let cases = [
            ("api", "/api/"),
            ("/api", "/api/"),
            ("api/", "/api/"),
            ("/api/", "/api/"),
            ("/api/v1", "/api/v1/"),
            ("", "/"),
            ("/", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_prefix(input), expected, "입력: {:?}", input);
        }
    }

    #[test]
    fn test_clean_path() {
        let cases = [
            ("/", "/"),
            ("", "/"),
            ("/api/v1", "/api/v1"),
            ("/api/v1/", "/api/v1/"),
            ("//api///v1", "/api/v1"),
            ("/api/./v1/", "/api/v1/"),
            ("/api/../admin/secret", "/admin/secret"),
            ("/../../etc", "/etc"),
            ("/a/..", "/"),
            ("/a/../", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_path(input), expected, "입력: {:?}", input);
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::build(&[
            ProxySpec::new("/api", "http://short"),
            ProxySpec::new("/api/v2", "http://long"),
        ])
        .unwrap();

        match table.dispatch("/api/v2/users") {
            Dispatch::Proxy(route) => assert_eq!(route.upstream(), "http://long"),
            other => panic!("예상치 못한 결과: {:?}", other),
        }
        match table.dispatch("/api/v1/users") {
            Dispatch::Proxy(route) => assert_eq!(route.upstream(), "http://short"),
            other => panic!("예상치 못한 결과: {:?}", other),
        }
    }

    #[test]
    fn test_missing_trailing_slash_redirects() {
        let table = RouteTable::build(&[
            ProxySpec::new("/", "http://root"),
            ProxySpec::new("/api", "http://api"),
        ])
        .unwrap();

        assert!(matches!(table.dispatch("/api"), Dispatch::Redirect(p) if p == "/api/"));
        assert!(matches!(table.dispatch("/apix"), Dispatch::Proxy(r) if r.upstream() == "http://root"));
    }

    #[test]
    fn test_route_name_defaults_to_prefix() {
        let mut named = ProxySpec::new("/b", "http://b");
        named.name = "service-b".to_string();
        let table = RouteTable::build(&[ProxySpec::new("a", "http://a"), named]).unwrap();

        assert_eq!(table.routes()[0].name, "/a/");
        assert_eq!(table.routes()[1].name, "service-b");
    }
}

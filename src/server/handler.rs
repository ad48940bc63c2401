use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::body::Incoming;
use hyper::header::{HeaderValue, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use tracing::debug;

use crate::proxy::{self, full_body, ProxyBody, ProxyClient};
use crate::routing::Dispatch;
use super::reload::SharedRoutes;

/// catch-all 라우트가 없을 때 `/` 아래 모든 미매칭 경로에 돌려주는 본문
pub const LOST_MESSAGE: &str = "Hello there! You seem to be lost!";

pub struct RequestHandler {
    routes: SharedRoutes,
    client: ProxyClient,
}

impl RequestHandler {
    pub fn new(routes: SharedRoutes, client: ProxyClient) -> Self {
        Self { routes, client }
    }

    /// 요청 하나는 처음 읽은 라우팅 테이블 하나로만 처리됩니다.
    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote: SocketAddr,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let table = self.routes.load_full();
        let dispatch = table.dispatch(req.uri().path());

        let response = match dispatch {
            Dispatch::Proxy(route) => proxy::proxy_request(&self.client, route, req, remote).await,
            Dispatch::Redirect(path) => {
                debug!(from = %req.uri().path(), to = %path, "끝 슬래시 리다이렉트");
                redirect_response(&path, req.uri().query())
            }
            Dispatch::Lost => {
                debug!(path = %req.uri().path(), "매칭되는 라우트 없음");
                lost_response()
            }
        };

        Ok(response)
    }

    pub async fn handle_connection<I>(&self, io: I, remote: SocketAddr) -> Result<(), hyper::Error>
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        http1::Builder::new()
            .serve_connection(io, service_fn(|req| self.handle_request(req, remote)))
            .with_upgrades()
            .await
    }
}

pub fn lost_response() -> Response<ProxyBody> {
    Response::new(full_body(LOST_MESSAGE))
}

/// 301 Moved Permanently. 쿼리 문자열은 유지합니다.
pub fn redirect_response(path: &str, query: Option<&str>) -> Response<ProxyBody> {
    let location = match query {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    };

    let mut response = Response::new(full_body("Moved Permanently"));
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(_) => *response.status_mut() = StatusCode::BAD_REQUEST,
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_lost_response() {
        let response = lost_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, LOST_MESSAGE.as_bytes());
    }

    #[test]
    fn test_redirect_keeps_query() {
        let response = redirect_response("/api/", Some("page=2"));
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "/api/?page=2");

        let response = redirect_response("/api/", None);
        assert_eq!(response.headers()[LOCATION], "/api/");
    }
}

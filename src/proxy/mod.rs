//! 매칭된 라우트의 요청을 업스트림으로 전달합니다.

mod client;
mod director;
mod error;

use std::net::SocketAddr;
use std::time::Instant;
use hyper::{Request, Response, StatusCode};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use http_body_util::{BodyExt, Full};
use http_body_util::combinators::BoxBody;
use uuid::Uuid;
use tracing::{debug, info, instrument, warn};

use crate::logging::{RequestLog, log_request};
use crate::routing::ProxyRoute;

pub use client::ProxyClient;
pub use director::{remove_hop_headers, restore_upgrade, upgrade_protocol, Director};
pub use error::ProxyError;

/// 서버가 돌려주는 응답 본문. 업스트림 응답은 버퍼링 없이 그대로 스트리밍됩니다.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

#[instrument(skip(client, route, req), fields(request_id = tracing::field::Empty, prefix = %route.prefix()))]
pub async fn proxy_request(
    client: &ProxyClient,
    route: &ProxyRoute,
    mut req: Request<Incoming>,
    remote: SocketAddr,
) -> Response<ProxyBody> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", request_id.as_str());
    let start_time = Instant::now();
    let mut log = RequestLog::new(request_id);
    log.with_request(&req);
    log.with_upstream(route.upstream());

    let client_upgrade = upgrade_protocol(req.headers()).map(|_| hyper::upgrade::on(&mut req));

    let response = match route.director().rewrite(req, Some(remote.ip())) {
        Ok(proxied_req) => {
            info!(uri = %proxied_req.uri(), "업스트림으로 요청 전달");
            match client.forward(proxied_req).await {
                Ok(res) if res.status() == StatusCode::SWITCHING_PROTOCOLS => {
                    switch_protocols(res, client_upgrade, &mut log)
                }
                Ok(res) => {
                    log.with_response(res.status());
                    let (mut parts, body) = res.into_parts();
                    remove_hop_headers(&mut parts.headers);
                    Response::from_parts(parts, body.boxed())
                }
                Err(e) => {
                    log.with_error(&e);
                    log.with_response(StatusCode::BAD_GATEWAY);
                    error_response(StatusCode::BAD_GATEWAY, format!("Bad Gateway: {}", e))
                }
            }
        }
        Err(e) => {
            log.with_error(&e);
            log.with_response(StatusCode::BAD_REQUEST);
            error_response(StatusCode::BAD_REQUEST, format!("Failed to build request: {}", e))
        }
    };

    log.duration_ms = start_time.elapsed().as_millis() as u64;
    log_request(&log);

    response
}

/// 업스트림의 101 응답을 클라이언트에 전달하고, 양쪽 연결이 업그레이드되면 바이트를 그대로 중계합니다.
fn switch_protocols(
    mut res: Response<Incoming>,
    client_upgrade: Option<OnUpgrade>,
    log: &mut RequestLog,
) -> Response<ProxyBody> {
    let (client_upgrade, protocol) = match (client_upgrade, upgrade_protocol(res.headers())) {
        (Some(client_upgrade), Some(protocol)) => (client_upgrade, protocol),
        _ => {
            let message = "업스트림이 요청하지 않은 프로토콜 전환을 시도했습니다";
            log.with_error(message);
            log.with_response(StatusCode::BAD_GATEWAY);
            return error_response(StatusCode::BAD_GATEWAY, format!("Bad Gateway: {}", message));
        }
    };

    log.with_response(res.status());
    let upstream_upgrade = hyper::upgrade::on(&mut res);
    tokio::spawn(tunnel(client_upgrade, upstream_upgrade));

    let (mut parts, body) = res.into_parts();
    remove_hop_headers(&mut parts.headers);
    restore_upgrade(&mut parts.headers, protocol);
    Response::from_parts(parts, body.boxed())
}

async fn tunnel(client: OnUpgrade, upstream: OnUpgrade) {
    let (client, upstream) = match tokio::try_join!(client, upstream) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "업그레이드 연결 수립 실패");
            return;
        }
    };

    let mut client = TokioIo::new(client);
    let mut upstream = TokioIo::new(upstream);
    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((from_client, from_upstream)) => {
            debug!(from_client, from_upstream, "업그레이드 연결 종료");
        }
        Err(e) => debug!(error = %e, "업그레이드 연결이 비정상 종료됨"),
    }
}

pub fn error_response(status: StatusCode, message: String) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(message));
    *response.status_mut() = status;
    response
}

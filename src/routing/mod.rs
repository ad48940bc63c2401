//! URL 경로 prefix 기반 라우팅 테이블입니다.

mod error;
mod table;

pub use error::RoutingError;
pub use table::{clean_path, normalize_prefix, Dispatch, ProxyRoute, RouteTable};

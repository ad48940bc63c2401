//! SooProxy는 URL 경로 prefix로 업스트림을 고르는 로컬 개발용 리버스 프록시입니다.
//!
//! # 주요 기능
//!
//! - prefix 기반 라우팅 (가장 긴 prefix 우선, 먼저 등록된 prefix 우선)
//! - 설정 파일 변경 시 무중단 라우팅 테이블 교체
//! - 로컬 CA로 서명한 인증서를 이용한 HTTPS 종단
//!
//! # 예제
//!
//! ```
//! use sooproxy::routing::{Dispatch, RouteTable};
//! use sooproxy::settings::ProxySpec;
//!
//! let table = RouteTable::build(&[
//!     ProxySpec::new("/api", "http://localhost:3000"),
//!     ProxySpec::new("/", "http://localhost:5173"),
//! ]).unwrap();
//!
//! match table.dispatch("/api/users") {
//!     Dispatch::Proxy(route) => {
//!         assert_eq!(route.upstream(), "http://localhost:3000");
//!         assert_eq!(route.director().rewrite_path("/api/users"), "/users");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

pub mod ca;
pub mod cli;
pub mod logging;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod settings;
pub mod tls;

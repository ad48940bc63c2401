use std::path::Path;

use tracing::{debug, error, info, span, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::settings::{LogFormat, LogOutput, LogSettings};

const DEFAULT_LOG_FILE: &str = "sooproxy.log";

/// 전역 subscriber를 설치합니다. 반환된 guard가 살아 있는 동안 로그가 기록됩니다.
///
/// `RUST_LOG`가 있으면 해당 지시어가 `settings.level` 위에 더해집니다.
pub fn init_logging(settings: &LogSettings) -> WorkerGuard {
    let filter = EnvFilter::from_default_env().add_directive(settings.level.into());

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(settings.output == LogOutput::Stdout)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    guard
}

#[derive(Debug)]
pub struct RequestLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub host: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub upstream: Option<String>,
    pub error: Option<String>,
}

impl RequestLog {
    pub fn new(request_id: String) -> Self {
        debug!(request_id = %request_id, "Creating new request log");
        Self {
            request_id,
            method: String::new(),
            path: String::new(),
            host: String::new(),
            status_code: 0,
            duration_ms: 0,
            upstream: None,
            error: None,
        }
    }

    pub fn with_request<B>(&mut self, req: &hyper::Request<B>) {
        self.method = req.method().to_string();
        self.path = req.uri().path().to_string();
        if let Some(host) = req.headers().get(hyper::header::HOST) {
            self.host = host.to_str().unwrap_or_default().to_string();
        }

        debug!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            host = %self.host,
            "Received request"
        );
    }

    pub fn with_response(&mut self, status: hyper::StatusCode) {
        self.status_code = status.as_u16();
    }

    pub fn with_upstream(&mut self, upstream: &str) {
        self.upstream = Some(upstream.to_string());
        debug!(
            request_id = %self.request_id,
            upstream = %upstream,
            "Selected upstream"
        );
    }

    pub fn with_error(&mut self, error: impl std::fmt::Display) {
        let error_msg = error.to_string();
        error!(
            request_id = %self.request_id,
            error = %error_msg,
            "Request error occurred"
        );
        self.error = Some(error_msg);
    }

    pub fn level(&self) -> Level {
        if self.error.is_some() || self.status_code >= 500 {
            Level::ERROR
        } else if self.status_code >= 400 {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

pub fn log_request(log: &RequestLog) {
    let level = log.level();

    let span = span!(
        Level::INFO,
        "request",
        request_id = %log.request_id,
        method = %log.method,
        path = %log.path,
        host = %log.host,
        status = %log.status_code,
        duration_ms = %log.duration_ms
    );
    let _enter = span.enter();

    match level {
        Level::ERROR => error!(
            upstream = ?log.upstream,
            error = ?log.error,
            "Request failed"
        ),
        Level::WARN => warn!(
            upstream = ?log.upstream,
            "Request completed with warning"
        ),
        _ => info!(
            upstream = ?log.upstream,
            "Request completed successfully"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_log_level() {
        let mut log = RequestLog::new("test".to_string());
        log.with_response(hyper::StatusCode::OK);
        assert_eq!(log.level(), Level::INFO);

        log.with_response(hyper::StatusCode::NOT_FOUND);
        assert_eq!(log.level(), Level::WARN);

        log.with_response(hyper::StatusCode::BAD_GATEWAY);
        assert_eq!(log.level(), Level::ERROR);

        log.with_response(hyper::StatusCode::OK);
        log.with_error("connection refused");
        assert_eq!(log.level(), Level::ERROR);
    }

    #[test]
    fn test_request_log_captures_request() {
        let req = hyper::Request::builder()
            .method("POST")
            .uri("/api/users?x=1")
            .header(hyper::header::HOST, "example.local")
            .body(())
            .unwrap();

        let mut log = RequestLog::new("id".to_string());
        log.with_request(&req);
        log.with_upstream("http://localhost:3000");

        assert_eq!(log.method, "POST");
        assert_eq!(log.path, "/api/users");
        assert_eq!(log.host, "example.local");
        assert_eq!(log.upstream.as_deref(), Some("http://localhost:3000"));
    }
}

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use sooproxy::ca::{CaError, CaStore};
use sooproxy::cli::{Cli, Command};
use sooproxy::logging::init_logging;
use sooproxy::server::ServerManager;
use sooproxy::settings::{LogSettings, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_settings = LogSettings::from_env().unwrap_or_else(|e| {
        eprintln!("로그 설정 오류, 기본값 사용: {}", e);
        LogSettings::default()
    });
    let _guard = init_logging(&log_settings);

    let ca_store = match cli.ca_store() {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "CA 디렉터리를 결정할 수 없습니다");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Command::CaTrust) => run_blocking(move || trust_ca(&ca_store)).await,
        Some(Command::CaGen) => run_blocking(move || ca_store.generate_ca().map(|_| ())).await,
        None => serve(&cli, ca_store).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "실행 실패");
            ExitCode::FAILURE
        }
    }
}

/// CA가 있으면 신뢰 저장소에만 등록하고, 없으면 생성합니다(생성 시 등록 포함).
fn trust_ca(store: &CaStore) -> Result<(), CaError> {
    if store.cert_path().exists() && store.key_path().exists() {
        store.load()?;
        store.install_trust();
    } else {
        store.ensure_ca()?;
    }
    Ok(())
}

async fn run_blocking<F>(task: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce() -> Result<(), CaError> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await??;
    Ok(())
}

async fn serve(cli: &Cli, ca_store: CaStore) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = cli.overrides();
    let settings = Settings::load(&overrides);
    info!(
        addr = %settings.listen_addr(),
        secure = settings.secure,
        proxies = settings.proxies.len(),
        "설정 로드 완료"
    );

    let manager = ServerManager::bind(settings, overrides, ca_store).await?;

    tokio::select! {
        result = manager.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("종료 신호 수신"),
    }
    Ok(())
}

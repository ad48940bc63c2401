//! 운영체제 신뢰 저장소에 CA 인증서를 등록합니다.
//!
//! 실제 명령 실행은 [`CommandRunner`] 뒤에 숨겨 두어 테스트에서 대체할 수 있습니다.

use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use super::CaError;

const TRUST_FILE_NAME: &str = "sooproxy-ca.crt";
const DEBIAN_ANCHOR_DIR: &str = "/usr/local/share/ca-certificates";
const REDHAT_ANCHOR_DIR: &str = "/etc/pki/ca-trust/source/anchors";
const MACOS_SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

/// 신뢰 저장소 설치 방식
pub trait TrustInstaller: Send + Sync {
    fn install(&self, cert_path: &Path) -> Result<(), CaError>;
}

/// 외부 명령 실행기. 실패 시 사람이 읽을 수 있는 사유를 돌려줍니다.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &TrustCommand) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxFamily {
    /// update-ca-certificates
    Debian,
    /// update-ca-trust
    RedHat,
}

impl LinuxFamily {
    fn detect() -> Self {
        if Path::new(DEBIAN_ANCHOR_DIR).is_dir() || Path::new("/usr/sbin/update-ca-certificates").exists() {
            LinuxFamily::Debian
        } else {
            LinuxFamily::RedHat
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux(LinuxFamily),
    Unsupported,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux(LinuxFamily::detect())
        } else {
            Platform::Unsupported
        }
    }

    /// 인증서를 신뢰 저장소에 넣기 위해 차례로 실행할 명령 목록
    pub fn trust_commands(&self, cert_path: &Path) -> Vec<TrustCommand> {
        let cert = cert_path.to_string_lossy().into_owned();
        match self {
            Platform::Windows => vec![TrustCommand::new(
                "certutil",
                ["-addstore", "-f", "Root", cert.as_str()],
            )],
            Platform::MacOs => vec![TrustCommand::new(
                "security",
                [
                    "add-trusted-cert",
                    "-d",
                    "-r",
                    "trustRoot",
                    "-k",
                    MACOS_SYSTEM_KEYCHAIN,
                    cert.as_str(),
                ],
            )],
            Platform::Linux(LinuxFamily::Debian) => {
                let target = format!("{}/{}", DEBIAN_ANCHOR_DIR, TRUST_FILE_NAME);
                vec![
                    TrustCommand::new("sudo", ["cp", cert.as_str(), target.as_str()]),
                    TrustCommand::new("sudo", ["update-ca-certificates"]),
                ]
            }
            Platform::Linux(LinuxFamily::RedHat) => {
                let target = format!("{}/{}", REDHAT_ANCHOR_DIR, TRUST_FILE_NAME);
                vec![
                    TrustCommand::new("sudo", ["cp", cert.as_str(), target.as_str()]),
                    TrustCommand::new("sudo", ["update-ca-trust"]),
                ]
            }
            Platform::Unsupported => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TrustCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for TrustCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `std::process::Command`로 실제 명령을 실행합니다.
#[derive(Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &TrustCommand) -> Result<(), String> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{} ({})", stderr.trim(), output.status))
        }
    }
}

/// 플랫폼별 명령을 실행하는 기본 설치기
pub struct PlatformTrust {
    platform: Platform,
    runner: Box<dyn CommandRunner>,
}

impl PlatformTrust {
    pub fn new(platform: Platform, runner: Box<dyn CommandRunner>) -> Self {
        Self { platform, runner }
    }

    pub fn current() -> Self {
        Self::new(Platform::current(), Box::new(SystemCommandRunner))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl TrustInstaller for PlatformTrust {
    fn install(&self, cert_path: &Path) -> Result<(), CaError> {
        let commands = self.platform.trust_commands(cert_path);
        if commands.is_empty() {
            warn!(platform = ?self.platform, "지원하지 않는 운영체제입니다. 신뢰 저장소 등록을 건너뜁니다");
            return Ok(());
        }

        for command in &commands {
            debug!(command = %command, "신뢰 저장소 명령 실행");
            self.runner.run(command).map_err(|reason| CaError::Trust {
                command: command.to_string(),
                reason,
            })?;
        }

        info!(cert = %cert_path.display(), "CA 인증서를 신뢰 저장소에 등록했습니다");
        Ok(())
    }
}

/// 실패해도 프로세스를 멈추지 않고 경고만 남깁니다.
pub fn install_trust(installer: &dyn TrustInstaller, cert_path: &Path) -> bool {
    match installer.install(cert_path) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                cert = %cert_path.display(),
                "CA 인증서를 신뢰 저장소에 등록하지 못했습니다. 관리자 권한으로 `sooproxy ca-trust`를 다시 실행하세요"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingRunner {
        calls: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &TrustCommand) -> Result<(), String> {
            self.calls.lock().unwrap().push(command.to_string());
            match self.fail_on {
                Some(needle) if command.to_string().contains(needle) => Err("permission denied".to_string()),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_debian_commands() {
        let commands = Platform::Linux(LinuxFamily::Debian).trust_commands(Path::new("/home/u/.sooproxy/ca.pem"));
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0].to_string(),
            "sudo cp /home/u/.sooproxy/ca.pem /usr/local/share/ca-certificates/sooproxy-ca.crt"
        );
        assert_eq!(commands[1].to_string(), "sudo update-ca-certificates");
    }

    #[test]
    fn test_platform_commands() {
        let cert = Path::new("ca.pem");
        assert_eq!(
            Platform::Windows.trust_commands(cert),
            vec![TrustCommand::new("certutil", ["-addstore", "-f", "Root", "ca.pem"])]
        );
        assert_eq!(Platform::MacOs.trust_commands(cert)[0].program, "security");
        assert_eq!(
            Platform::Linux(LinuxFamily::RedHat).trust_commands(cert)[1],
            TrustCommand::new("sudo", ["update-ca-trust"])
        );
        assert!(Platform::Unsupported.trust_commands(cert).is_empty());
    }

    #[test]
    fn test_install_runs_commands_in_order() {
        let runner = RecordingRunner::default();
        let calls = runner.calls.clone();
        let trust = PlatformTrust::new(Platform::Linux(LinuxFamily::RedHat), Box::new(runner));

        assert!(trust.install(Path::new("ca.pem")).is_ok());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("sudo cp ca.pem"));
        assert_eq!(calls[1], "sudo update-ca-trust");
    }

    #[test]
    fn test_install_failure_is_not_fatal() {
        let runner = RecordingRunner {
            fail_on: Some(" cp "),
            ..Default::default()
        };
        let calls = runner.calls.clone();
        let trust = PlatformTrust::new(Platform::Linux(LinuxFamily::Debian), Box::new(runner));

        let err = trust.install(Path::new("ca.pem")).unwrap_err();
        assert!(matches!(err, CaError::Trust { ref reason, .. } if reason == "permission denied"));
        // 첫 명령이 실패하면 나머지는 실행하지 않음
        assert_eq!(calls.lock().unwrap().len(), 1);

        assert!(!install_trust(&trust, Path::new("ca.pem")));
    }
}

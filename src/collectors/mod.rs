pub mod services;
pub mod system;

use crate::session::{RemoteExec, SessionError};
use crate::state::ServiceStatus;
use system::{
    parse_cpu_usage, parse_distro, parse_kernel, parse_memory, parse_storage, parse_uptime,
    CPU_COMMAND, DISTRO_COMMAND, KERNEL_COMMAND, MEMORY_COMMAND, STORAGE_COMMAND, UPTIME_COMMAND,
};
use thiserror::Error;

/// Metrics of one poll cycle. Always fully populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub ram_total: u64,
    pub ram_used: u64,
    pub uptime: String,
    pub storage_total: String,
    pub storage_used: String,
    pub cpu_usage: f64,
    pub services: Vec<ServiceStatus>,
    pub distro_name: String,
    pub kernel_version: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("в выводе нет строки {line}")]
    MissingLine { line: usize },
    #[error("нет колонки {column} в строке '{line}'")]
    MissingColumn { column: usize, line: String },
    #[error("'{value}' не является числом")]
    InvalidNumber { value: String },
    #[error("не найдено поле '{0}'")]
    MissingField(&'static str),
    #[error("значение {value} вне диапазона {min}..{max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("пустой вывод")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("не удалось разобрать вывод '{command}': {source}")]
    Parse { command: String, source: ParseError },
}

impl CollectError {
    /// Transport failures leave the session unusable; output-shape failures
    /// only spoil the current cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectError::Session(_))
    }
}

/// Runs the fixed command sequence, one blocking round trip per command.
pub fn collect_snapshot<S: RemoteExec + ?Sized>(
    session: &mut S,
    service_names: &[String],
) -> Result<Snapshot, CollectError> {
    let (ram_total, ram_used) = run_parsed(session, MEMORY_COMMAND, parse_memory)?;
    let uptime = run_parsed(session, UPTIME_COMMAND, parse_uptime)?;
    let (storage_total, storage_used) = run_parsed(session, STORAGE_COMMAND, parse_storage)?;
    let cpu_usage = run_parsed(session, CPU_COMMAND, parse_cpu_usage)?;
    let services = services::collect_services(session, service_names)?;
    let distro_name = run_parsed(session, DISTRO_COMMAND, parse_distro)?;
    let kernel_version = run_parsed(session, KERNEL_COMMAND, parse_kernel)?;

    Ok(Snapshot {
        ram_total,
        ram_used,
        uptime,
        storage_total,
        storage_used,
        cpu_usage,
        services,
        distro_name,
        kernel_version,
    })
}

pub(crate) fn run_parsed<S, T, F>(session: &mut S, command: &str, parse: F) -> Result<T, CollectError>
where
    S: RemoteExec + ?Sized,
    F: FnOnce(&str) -> Result<T, ParseError>,
{
    let output = session.exec(command)?;
    parse(&output).map_err(|source| CollectError::Parse {
        command: command.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::FakeSession;

    fn default_services() -> Vec<String> {
        vec![
            "boxy-ben".to_string(),
            "boxy-flo".to_string(),
            "minecraftserver".to_string(),
        ]
    }

    #[test]
    fn healthy_host_yields_full_snapshot() {
        let mut session = FakeSession::healthy_host();
        let snapshot = collect_snapshot(&mut session, &default_services()).unwrap();

        assert_eq!(snapshot.ram_used, 512);
        assert_eq!(snapshot.ram_total, 2048);
        assert_eq!(snapshot.storage_used, "40G");
        assert_eq!(snapshot.storage_total, "100G");
        assert_eq!(snapshot.cpu_usage, 3.2);
        assert_eq!(snapshot.uptime, "up 3 days, 4 hours");
        assert_eq!(snapshot.distro_name, "Test OS");
        assert_eq!(snapshot.kernel_version, "5.15.0");
        assert_eq!(snapshot.services.len(), 3);
        assert!(snapshot.services.iter().all(|s| s.state == "active"));
    }

    #[test]
    fn commands_run_in_fixed_order() {
        let mut session = FakeSession::healthy_host();
        collect_snapshot(&mut session, &default_services()).unwrap();

        let log = session.log.lock().unwrap().clone();
        assert_eq!(
            log,
            [
                "free -m",
                "uptime -p",
                "df -h --total | grep total",
                "top -bn1 | grep '%Cpu(s)'",
                "systemctl is-active boxy-ben",
                "systemctl is-active boxy-flo",
                "systemctl is-active minecraftserver",
                "lsb_release -d",
                "uname -r",
            ]
        );
    }

    #[test]
    fn bad_cpu_line_aborts_the_cycle() {
        let mut session =
            FakeSession::healthy_host().with("top -bn1 | grep '%Cpu(s)'", "%Cpu(s): n/a\n");
        let err = collect_snapshot(&mut session, &default_services()).unwrap_err();

        assert!(!err.is_fatal());
        match err {
            CollectError::Parse { command, source } => {
                assert_eq!(command, CPU_COMMAND);
                assert_eq!(source, ParseError::MissingField("us"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing after the failing command is issued
        assert_eq!(session.issued_count(), 4);
    }

    #[test]
    fn dropped_session_is_fatal() {
        let mut session = FakeSession::healthy_host().without("uname -r");
        let err = collect_snapshot(&mut session, &default_services()).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CollectError::Session(SessionError::Read { .. })));
    }
}

use crate::config::SshConfig;
use ssh2::Session;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Something that can run a shell command on the monitored host and hand back
/// its stdout.
pub trait RemoteExec {
    fn exec(&mut self, command: &str) -> Result<String, SessionError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("не удалось подключиться к {target}: {source}")]
    Connect { target: String, source: io::Error },
    #[error("ошибка SSH-рукопожатия с {target}: {source}")]
    Handshake { target: String, source: ssh2::Error },
    #[error("ошибка аутентификации пользователя {username}: {source}")]
    Auth {
        username: String,
        source: ssh2::Error,
    },
    #[error("сервер отклонил пароль пользователя {username}")]
    Rejected { username: String },
    #[error("не удалось выполнить '{command}': {source}")]
    Exec {
        command: String,
        source: ssh2::Error,
    },
    #[error("не удалось прочитать вывод '{command}': {source}")]
    Read { command: String, source: io::Error },
}

/// One authenticated SSH session, reused for every command of the run.
/// Host keys are not verified.
pub struct SshSession {
    session: Session,
    target: String,
}

impl SshSession {
    pub fn connect(cfg: &SshConfig, password: &str) -> Result<Self, SessionError> {
        let target = cfg.target();
        let tcp = open_tcp(cfg).map_err(|source| SessionError::Connect {
            target: target.clone(),
            source,
        })?;

        let mut session = Session::new().map_err(|source| SessionError::Handshake {
            target: target.clone(),
            source,
        })?;
        if let Some(ms) = cfg.timeout_ms {
            session.set_timeout(u32::try_from(ms).unwrap_or(u32::MAX));
        }
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|source| SessionError::Handshake {
                target: target.clone(),
                source,
            })?;

        session
            .userauth_password(&cfg.username, password)
            .map_err(|source| SessionError::Auth {
                username: cfg.username.clone(),
                source,
            })?;
        if !session.authenticated() {
            return Err(SessionError::Rejected {
                username: cfg.username.clone(),
            });
        }

        info!(host = %target, username = %cfg.username, "SSH session established");
        Ok(Self { session, target })
    }
}

impl RemoteExec for SshSession {
    fn exec(&mut self, command: &str) -> Result<String, SessionError> {
        let exec_err = |source| SessionError::Exec {
            command: command.to_string(),
            source,
        };
        let read_err = |source| SessionError::Read {
            command: command.to_string(),
            source,
        };

        let mut channel = self.session.channel_session().map_err(exec_err)?;
        channel.exec(command).map_err(exec_err)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(read_err)?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(read_err)?;
        channel.wait_close().map_err(exec_err)?;

        // `systemctl is-active` exits non-zero for inactive units, so the
        // status is informational only.
        let status = channel.exit_status().map_err(exec_err)?;
        debug!(
            host = %self.target,
            command,
            status,
            stderr = %stderr.trim(),
            "remote command finished"
        );
        Ok(stdout)
    }
}

fn open_tcp(cfg: &SshConfig) -> io::Result<TcpStream> {
    let host = cfg.hostname.as_str();
    let Some(ms) = cfg.timeout_ms else {
        return TcpStream::connect((host, cfg.port));
    };

    let timeout = Duration::from_millis(ms);
    let mut last_err = None;
    for addr in (host, cfg.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses")
    }))
}

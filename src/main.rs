mod collectors;
mod config;
mod dashboard;
mod render;
mod session;
mod state;
mod tui;

use clap::Parser;
use config::Config;
use dashboard::LoopOptions;
use session::SshSession;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tui::Tui;

#[derive(Parser, Debug)]
#[command(name = "vpsmon")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.toml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `dashboard.interval_secs`.
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Write logs here instead of stderr while the dashboard owns the screen.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref());

    if cli.print_default_config {
        println!("{}", Config::example_toml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if let Some(secs) = cli.interval_secs {
        cfg.dashboard.interval_secs = secs;
        if let Err(err) = cfg.validate() {
            error!(error = %err, "некорректный --interval-secs");
            std::process::exit(1);
        }
    }

    let password = match cfg.ssh.resolve_password() {
        Ok(password) => password,
        Err(err) => {
            error!(error = %err, "не удалось подготовить настройки SSH");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                error!(error = %err, "не удалось дождаться Ctrl+C");
                // dropping the sender would read as a shutdown request
                std::future::pending::<()>().await;
            }
        }
    });

    info!(
        host = %cfg.ssh.hostname,
        port = cfg.ssh.port,
        username = %cfg.ssh.username,
        "подключение к серверу"
    );
    let ssh_cfg = cfg.ssh.clone();
    let connect = move || SshSession::connect(&ssh_cfg, &password);
    let session = match dashboard::blocking_until_shutdown(connect, &mut shutdown_rx).await {
        Ok(Some(Ok(session))) => session,
        Ok(Some(Err(err))) => {
            error!(error = %err, "не удалось установить SSH-сессию");
            std::process::exit(1);
        }
        Ok(None) => {
            info!("получен Ctrl+C во время подключения, vpsmon остановлен");
            tui::clear_screen();
            std::process::exit(0);
        }
        Err(err) => {
            error!(error = %err, "задача подключения завершилась аварийно");
            std::process::exit(1);
        }
    };

    tui::install_panic_hook();
    let mut tui = match Tui::new().and_then(|mut t| t.enter().map(|_| t)) {
        Ok(t) => t,
        Err(err) => {
            error!(error = %err, "не удалось подготовить терминал");
            std::process::exit(1);
        }
    };

    let options = LoopOptions::from_config(&cfg.dashboard);
    info!(
        interval_secs = cfg.dashboard.interval_secs,
        services = cfg.dashboard.services.len(),
        "запуск vpsmon"
    );
    let result = dashboard::run(session, tui.terminal_mut(), &options, shutdown_rx).await;
    signal_task.abort();

    match result {
        Ok(state) => {
            info!(
                cycles = state.cycles,
                failed_cycles = state.failed_cycles,
                "получен Ctrl+C, vpsmon остановлен"
            );
            tui.exit_and_clear();
            std::process::exit(0);
        }
        Err(err) => {
            tui.exit();
            error!(error = %err, "vpsmon остановлен из-за ошибки");
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file.map(|path| OpenOptions::new().create(true).append(true).open(path)) {
        Some(Ok(file)) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        Some(Err(err)) => {
            builder.with_writer(std::io::stderr).init();
            warn!(error = %err, "не удалось открыть лог-файл, логи идут в stderr");
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
}

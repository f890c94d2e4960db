use crate::collectors::{collect_snapshot, CollectError};
use crate::config::DashboardConfig;
use crate::render::{draw_dashboard, draw_failure, DashboardView};
use crate::session::RemoteExec;
use crate::state::State;
use ratatui::{backend::Backend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub interval: Duration,
    pub services: Vec<String>,
    pub fail_fast: bool,
}

impl LoopOptions {
    pub fn from_config(cfg: &DashboardConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
            services: cfg.services.clone(),
            fail_fast: cfg.fail_fast,
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error("ошибка вывода в терминал: {0}")]
    Render(#[from] io::Error),
    #[error("задача сбора метрик завершилась аварийно: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Poll loop: collect, redraw, wait for the next tick, until `shutdown` flips.
///
/// The session is moved onto the blocking pool for each collection and handed
/// back afterwards, so commands never overlap. Returns the run bookkeeping on
/// a requested shutdown; transport errors (and any collection error when
/// `fail_fast` is set) end the loop with `Err`.
pub async fn run<S, B>(
    mut session: S,
    terminal: &mut Terminal<B>,
    options: &LoopOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<State, DashboardError>
where
    S: RemoteExec + Send + 'static,
    B: Backend,
{
    let mut state = State::new(now_unix());
    let services: Arc<[String]> = options.services.clone().into();
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown requested, stopping poll loop");
                break;
            }
            _ = ticker.tick() => {}
        }

        let names = services.clone();
        let collected = blocking_until_shutdown(
            move || {
                let outcome = collect_snapshot(&mut session, &names);
                (session, outcome)
            },
            &mut shutdown,
        )
        .await?;
        let Some((returned, outcome)) = collected else {
            info!("shutdown requested during collection");
            return Ok(state);
        };
        session = returned;

        let now = now_unix();
        match outcome {
            Ok(snapshot) => {
                state.record_success(now);
                let view = DashboardView::from_snapshot(&snapshot);
                terminal.clear()?;
                terminal.draw(|frame| draw_dashboard(frame, &view, &state))?;
            }
            Err(err) if err.is_fatal() || options.fail_fast => {
                return Err(err.into());
            }
            Err(err) => {
                warn!(error = %err, cycle = state.cycles + 1, "poll cycle failed");
                let message = err.to_string();
                state.record_failure(now, message.clone());
                terminal.clear()?;
                terminal.draw(|frame| draw_failure(frame, &message, &state))?;
            }
        }
    }

    Ok(state)
}

/// Runs `work` on the blocking pool. Resolves to `Ok(None)` as soon as
/// shutdown is requested, so a hung remote call never blocks Ctrl+C; the
/// abandoned thread dies with the process.
pub async fn blocking_until_shutdown<T, F>(
    work: F,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<T>, tokio::task::JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if *shutdown.borrow() {
        return Ok(None);
    }
    let mut worker = tokio::task::spawn_blocking(work);
    tokio::select! {
        joined = &mut worker => joined.map(Some),
        _ = shutdown.changed() => Ok(None),
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ParseError;
    use crate::session::testing::FakeSession;
    use ratatui::backend::TestBackend;

    fn options(interval: Duration) -> LoopOptions {
        LoopOptions {
            interval,
            services: vec![
                "boxy-ben".to_string(),
                "boxy-flo".to_string(),
                "minecraftserver".to_string(),
            ],
            fail_fast: false,
        }
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>()
    }

    async fn wait_for_commands(probe: &FakeSession, count: usize) {
        while probe.issued_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // let the loop finish the cycle it is in
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn shutdown_during_pause_ends_loop_cleanly() {
        let session = FakeSession::healthy_host();
        let probe = session.clone();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let (tx, rx) = watch::channel(false);
        let opts = options(Duration::from_secs(2));

        let (result, _) = tokio::join!(run(session, &mut terminal, &opts, rx), async {
            wait_for_commands(&probe, 9).await;
            tx.send(true).unwrap();
        });

        let state = result.expect("interrupt is a clean exit");
        assert_eq!(state.cycles, 1);
        assert_eq!(state.failed_cycles, 0);
        assert_eq!(probe.issued_count(), 9);

        let text = screen_text(&terminal);
        assert!(text.contains("RAM Usage"));
        assert!(text.contains("minecraftserver"));
        assert!(text.contains("Test OS"));
    }

    #[tokio::test]
    async fn parse_failure_skips_cycle_and_keeps_polling() {
        let session =
            FakeSession::healthy_host().with("lsb_release -d", "No LSB modules are available.\n");
        let probe = session.clone();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let (tx, rx) = watch::channel(false);
        let opts = options(Duration::from_millis(20));

        let (result, _) = tokio::join!(run(session, &mut terminal, &opts, rx), async {
            wait_for_commands(&probe, 16).await;
            tx.send(true).unwrap();
        });

        let state = result.expect("parse failures are not fatal");
        assert!(state.failed_cycles >= 2);
        assert_eq!(state.failed_cycles, state.cycles);
        assert!(state.last_error.unwrap().contains("lsb_release -d"));
        assert!(screen_text(&terminal).contains("Collection failed"));
    }

    #[tokio::test]
    async fn fail_fast_turns_parse_failure_into_error() {
        let session = FakeSession::healthy_host().with("uptime -p", "   \n");
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut opts = options(Duration::from_millis(20));
        opts.fail_fast = true;

        let err = run(session, &mut terminal, &opts, rx).await.unwrap_err();
        match err {
            DashboardError::Collect(CollectError::Parse { command, source }) => {
                assert_eq!(command, "uptime -p");
                assert_eq!(source, ParseError::Empty);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn lost_session_is_fatal() {
        let session = FakeSession::healthy_host().without("free -m");
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let (_tx, rx) = watch::channel(false);

        let err = run(session, &mut terminal, &options(Duration::from_millis(20)), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Collect(ref e) if e.is_fatal()));
    }

    #[tokio::test]
    async fn shutdown_abandons_hung_blocking_work() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (tx, mut rx) = watch::channel(false);

        let started = std::time::Instant::now();
        let (outcome, _) = tokio::join!(
            blocking_until_shutdown(
                move || {
                    let _ = release_rx.recv();
                    "connected"
                },
                &mut rx,
            ),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                tx.send(true).unwrap();
            }
        );

        assert_eq!(outcome.unwrap(), None);
        assert!(started.elapsed() < Duration::from_secs(2));
        release_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn blocking_work_result_is_returned_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        let outcome = blocking_until_shutdown(|| 40 + 2, &mut rx).await.unwrap();
        assert_eq!(outcome, Some(42));
    }

    #[tokio::test]
    async fn already_requested_shutdown_skips_collection() {
        let session = FakeSession::healthy_host();
        let probe = session.clone();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let state = run(session, &mut terminal, &options(Duration::from_secs(2)), rx)
            .await
            .unwrap();
        assert_eq!(state.cycles, 0);
        assert_eq!(probe.issued_count(), 0);
    }
}

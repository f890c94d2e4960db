use crate::collectors::{run_parsed, CollectError, ParseError};
use crate::collectors::system::non_empty_trimmed;
use crate::session::RemoteExec;
use crate::state::ServiceStatus;
use tracing::debug;

pub fn service_command(name: &str) -> String {
    format!("systemctl is-active {name}")
}

/// `systemctl is-active` prints a single state word; it is kept verbatim.
pub fn parse_service_state(text: &str) -> Result<String, ParseError> {
    non_empty_trimmed(text)
}

/// Queries each service in order, one round trip per service.
pub fn collect_services<S: RemoteExec + ?Sized>(
    session: &mut S,
    names: &[String],
) -> Result<Vec<ServiceStatus>, CollectError> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let state = run_parsed(session, &service_command(name), parse_service_state)?;
        debug!(service = %name, state = %state, "service state collected");
        out.push(ServiceStatus {
            name: name.clone(),
            state,
        });
    }
    Ok(out)
}

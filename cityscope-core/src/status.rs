use crate::authority::Reply;
use crate::error::TransportError;
use crate::model::ServiceState;

/// Status signal carried by a hub status reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusSignal {
    /// 200: instance is up
    Reachable,
    /// 204: instance exists but is not running
    ExistsNotReachable,
    /// 404: the hub has no instance for this user
    NoRecord,
    Unrecognized(u16),
}

impl StatusSignal {
    pub fn from_http(status: u16) -> Self {
        match status {
            200 => StatusSignal::Reachable,
            204 => StatusSignal::ExistsNotReachable,
            404 => StatusSignal::NoRecord,
            other => StatusSignal::Unrecognized(other),
        }
    }
}

/// Map a status query outcome onto a lifecycle state.
///
/// Anything that is not one of the three known signals is `Unknown`.
/// "Cannot tell" is never reported as `Unprovisioned`.
pub fn interpret(response: &Result<Reply, TransportError>) -> ServiceState {
    match response {
        Ok(reply) => match StatusSignal::from_http(reply.status) {
            StatusSignal::Reachable => ServiceState::Running,
            StatusSignal::ExistsNotReachable => ServiceState::Stopped,
            StatusSignal::NoRecord => ServiceState::Unprovisioned,
            StatusSignal::Unrecognized(_) => ServiceState::Unknown,
        },
        Err(_) => ServiceState::Unknown,
    }
}

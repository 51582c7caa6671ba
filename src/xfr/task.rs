use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::name::Name;

use super::tsig::TsigContext;

/// Sub-kind of transfer/control work an `XFRTask` carries out. Named after
/// the original implementation's own task-kind enum so log lines and
/// metrics read the same way operators already expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XfrKind {
    AxfrIn,
    IxfrIn,
    AxfrOut,
    IxfrOut,
    Notify,
    Soa,
    UpdateForward,
}

/// States an `XFRTask` moves through. Transitions only ever go forward
/// (Pending -> Connecting -> Running -> Finalizing -> Done|Failed); a task
/// that needs to retry (e.g. IXFR falling back to AXFR) is replaced with a
/// fresh task rather than rewound in place, so a task's history is always a
/// straight line for logging/metrics purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XfrState {
    Pending,
    Connecting,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// Why a task stopped, when it didn't reach `Done`.
#[derive(Debug, Clone)]
pub enum XfrOutcome {
    ConnectFailed(String),
    IxfrNotAvailable,
    TransferRefused,
    JournalGap,
    TsigFailed(String),
    Timeout,
    ProtocolError(String),
}

pub struct XfrTask {
    pub id: u64,
    pub kind: XfrKind,
    pub zone: Name,
    pub peer: SocketAddr,
    pub state: XfrState,
    pub outcome: Option<XfrOutcome>,
    pub tsig: Option<TsigContext>,
    pub started_at: Instant,
    pub watchdog_deadline: Instant,
    /// Set when an IXFR_IN hits ENOIXFR/EXFRREFUSED/a journal gap and the
    /// worker needs to retry the same zone transfer as AXFR_IN instead.
    pub fallback_to_axfr: bool,
    pub attempt: u32,
}

impl XfrTask {
    pub fn new(id: u64, kind: XfrKind, zone: Name, peer: SocketAddr, watchdog: Duration) -> Self {
        let now = Instant::now();
        XfrTask {
            id,
            kind,
            zone,
            peer,
            state: XfrState::Pending,
            outcome: None,
            tsig: None,
            started_at: now,
            watchdog_deadline: now + watchdog,
            fallback_to_axfr: false,
            attempt: 0,
        }
    }

    pub fn advance(&mut self, next: XfrState) {
        debug_assert!(
            Self::is_forward_transition(self.state, next),
            "XFRTask state machine only moves forward: {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    fn is_forward_transition(from: XfrState, to: XfrState) -> bool {
        use XfrState::*;
        matches!(
            (from, to),
            (Pending, Connecting)
                | (Connecting, Running)
                | (Running, Finalizing)
                | (Finalizing, Done)
                | (_, Failed)
        )
    }

    pub fn fail(&mut self, outcome: XfrOutcome) {
        self.outcome = Some(outcome);
        self.advance(XfrState::Failed);
    }

    pub fn finish(&mut self) {
        self.advance(XfrState::Done);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, XfrState::Done | XfrState::Failed)
    }

    /// IXFR_IN specific: mark for AXFR_IN retry instead of hard failure,
    /// per the ENOIXFR / EXFRREFUSED / journal-gap fallback paths.
    pub fn request_axfr_fallback(&mut self, outcome: XfrOutcome) {
        self.fallback_to_axfr = true;
        self.fail(outcome);
    }

    pub fn next_attempt(&self, zone: Name, peer: SocketAddr, watchdog: Duration) -> XfrTask {
        let mut next = XfrTask::new(self.id, self.kind, zone, peer, watchdog);
        next.attempt = self.attempt + 1;
        if self.fallback_to_axfr {
            next.kind = XfrKind::AxfrIn;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:53".parse().unwrap()
    }

    #[test]
    fn task_progresses_through_states_in_order() {
        let mut task = XfrTask::new(
            1,
            XfrKind::AxfrIn,
            Name::parse("example.com."),
            addr(),
            Duration::from_secs(60),
        );
        assert_eq!(task.state, XfrState::Pending);
        task.advance(XfrState::Connecting);
        task.advance(XfrState::Running);
        task.advance(XfrState::Finalizing);
        task.finish();
        assert_eq!(task.state, XfrState::Done);
        assert!(task.is_terminal());
    }

    #[test]
    fn ixfr_fallback_produces_an_axfr_retry_task() {
        let mut task = XfrTask::new(
            1,
            XfrKind::IxfrIn,
            Name::parse("example.com."),
            addr(),
            Duration::from_secs(60),
        );
        task.advance(XfrState::Connecting);
        task.request_axfr_fallback(XfrOutcome::IxfrNotAvailable);
        assert!(task.is_terminal());

        let retry = task.next_attempt(task.zone.clone(), addr(), Duration::from_secs(60));
        assert_eq!(retry.kind, XfrKind::AxfrIn);
        assert_eq!(retry.attempt, 1);
    }
}

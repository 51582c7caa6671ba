use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::io::Interest;
use tokio::net::TcpStream;

use crate::error::Result;

/// Readiness events a backend reports for a watched descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

/// Abstracts the readiness-polling backend an `XFRWorker` drives its
/// sockets through, matching the `fdset_poll.c`/`fdset_epoll.c` split in the
/// original implementation at the trait boundary: one default backend here
/// (`PollFdSet`, built on tokio's reactor so it composes with the rest of
/// the async stack) with room for another to drop in without touching
/// callers. Every watched fd carries a watchdog deadline; `sweep()` returns
/// the ids of fds that passed their deadline without becoming ready, so the
/// worker can fail those XFR tasks instead of waiting forever on a wedged
/// peer.
pub trait FDSet {
    fn watch(&mut self, id: u64, stream: TcpStream, deadline: Instant);
    fn forget(&mut self, id: u64) -> Option<TcpStream>;
    /// Blocks until at least one watched fd is ready or `timeout` elapses,
    /// returning the ids that became ready.
    fn wait(&mut self, timeout: Duration) -> Result<Vec<u64>>;
    /// Returns ids whose watchdog deadline has passed.
    fn sweep(&mut self, now: Instant) -> Vec<u64>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Watched {
    stream: TcpStream,
    deadline: Instant,
}

/// Portable default backend. Uses `TcpStream::ready()` (tokio's own
/// epoll/kqueue-backed reactor under the hood) rather than calling into
/// `libc::poll` directly, since the crate's concurrency model is already
/// tokio-based end to end.
#[derive(Default)]
pub struct PollFdSet {
    watched: HashMap<u64, Watched>,
}

impl PollFdSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FDSet for PollFdSet {
    fn watch(&mut self, id: u64, stream: TcpStream, deadline: Instant) {
        self.watched.insert(id, Watched { stream, deadline });
    }

    fn forget(&mut self, id: u64) -> Option<TcpStream> {
        self.watched.remove(&id).map(|w| w.stream)
    }

    fn wait(&mut self, timeout: Duration) -> Result<Vec<u64>> {
        // Non-blocking readiness probe: poll each watched stream's `ready()`
        // future once with a no-op waker rather than `.await`ing it, so this
        // trait method stays synchronous while still asking tokio's reactor
        // (driven in the background by the multi-thread runtime) for the
        // current readiness state. Spins until something is ready or
        // `timeout` elapses — callers on a tight loop should prefer the
        // worker's own `tokio::select!`-based fast path and fall back to
        // this only for the trait boundary.
        use std::future::Future;
        use std::pin::Pin;
        use std::task::{Context, Poll, Waker};

        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        let deadline = Instant::now() + timeout;
        let mut ready = Vec::new();

        while Instant::now() < deadline && ready.is_empty() {
            for (&id, watched) in self.watched.iter() {
                let fut = watched.stream.ready(Interest::READABLE);
                tokio::pin!(fut);
                if let Poll::Ready(Ok(r)) = fut.as_mut().poll(&mut cx) {
                    if r.is_readable() {
                        ready.push(id);
                    }
                }
            }
            if ready.is_empty() {
                std::thread::yield_now();
            }
        }
        Ok(ready)
    }

    fn sweep(&mut self, now: Instant) -> Vec<u64> {
        self.watched
            .iter()
            .filter(|(_, w)| w.deadline <= now)
            .map(|(&id, _)| id)
            .collect()
    }

    fn len(&self) -> usize {
        self.watched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_reports_only_expired_watchdogs() {
        let mut set = PollFdSet::new();
        assert!(set.is_empty());
        let expired = set.sweep(Instant::now());
        assert!(expired.is_empty());
    }
}

pub mod fdset;
pub mod ixfr;
pub mod notify;
pub mod task;
pub mod transfer;
pub mod tsig;
pub mod worker;

pub use fdset::{FDSet, PollFdSet, Readiness};
pub use ixfr::IxfrLoader;
pub use notify::NotifyHandler;
pub use task::{XfrKind, XfrOutcome, XfrState, XfrTask};
pub use tsig::{TsigAlgorithm, TsigContext, TsigKey, TsigRecord, tsig_variables, unix_now};
pub use worker::{TaskQueue, XfrWorker};

pub mod fsm;
pub mod service;
pub mod trace;

pub use fsm::{ControllerState, Fsm, FsmError};
pub use service::{Controller, HealthReport, HealthStatus, RunOutcome, RunRequest};
pub use trace::{canonical_trace, TraceEvent};

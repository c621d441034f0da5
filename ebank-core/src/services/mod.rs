//! Service layer - session coordination and supporting services
//!
//! The event sink is the single point where caller-side results and pushed
//! notifications meet; the session drives remote calls and owns the push
//! receiver; everything else (transaction log worker, diagnostics, demo mode,
//! status) supports those two.

mod demo;
mod event_sink;
mod log_worker;
pub mod logging;
mod receiver;
pub mod session;
mod status;

pub use demo::DemoService;
pub use event_sink::{ChannelSubscriber, EventSink, EventSubscriber};
pub use log_worker::TransactionLogWorker;
pub use logging::{record_quietly, Diagnostic, EntryPoint, LogEntry, LogStats, LoggingService};
pub use receiver::PushNotificationReceiver;
pub use session::BankSession;
pub use status::{StatusService, StatusSummary};

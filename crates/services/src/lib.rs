#![forbid(unsafe_code)]

pub mod answers;
pub mod app_services;
pub mod coach;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod grading;
pub mod persist;
pub mod progress;
pub mod runtime;
pub mod session;
pub mod timer;

pub use practice_core::Clock;

pub use answers::AnswerStore;
pub use app_services::{AppServices, DashboardOptions};
pub use coach::{CoachStateMachine, TimeboxChoice, TimeboxGate, TimeboxPrompt, WriteCoalescer};
pub use config::{RelayConfig, SessionConfig};
pub use dashboard::{
    DashboardIdentity, DashboardSyncClient, HelpOutcome, RecordingSink, RelayServer, StatusSink,
};
pub use error::{AppServicesError, GradeError, SessionError};
pub use export::GradingExport;
pub use grading::{GradeEngine, GradeReport, QuestionVerdict};
pub use persist::StateStore;
pub use progress::{Progress, ProgressTracker};
pub use runtime::{RuntimeEvent, SessionRuntime};
pub use session::{SessionContext, SessionOptions};
pub use timer::{ClockDisplay, ClockKind, SolveTimer};

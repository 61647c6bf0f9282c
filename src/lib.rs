#![doc = include_str!("../README.md")]

pub mod auth;
pub mod calendar;
pub mod capture;
pub mod client;
pub mod config;
pub mod cookies;
pub mod cycle;
pub mod document;
pub mod duo;
pub mod error;
pub mod extract;
pub mod leave;
pub mod quantize;
pub mod reporter;
pub mod secret;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use auth::{AuthChallenge, Authenticator, LoginState};
pub use calendar::{CalendarSource, DayReport};
pub use client::{DocumentClient, RequestBody};
pub use config::{ClientConfig, Credentials, DuoConfig, LoginIndicators, ReporterConfig};
pub use cookies::CookieJar;
pub use cycle::{OverdueStatus, ReportingCycle, cycle_end, cycle_start};
pub use document::{Document, Form, FormMethod};
pub use duo::{ApprovalStatus, DuoApprovalRequest, DuoDevice, DuoPoller};
pub use error::Error;
pub use leave::{LeaveCategory, LeaveEntry};
pub use quantize::{HalfDaySteps, Quantity, to_full_day_flag, to_half_day_steps, to_hour_count};
pub use reporter::{REJECTION_PHRASES, ReportMode, ReportOutcome, Reporter, SkipReason, Submission};
pub use secret::SecretString;
pub use session::Session;
pub use types::{ApprovalKey, AuthSignature, EmployeeId};

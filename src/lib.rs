#![doc = include_str!("../README.md")]

pub use crate::config::*;
pub use crate::delivery::{Delivery, DeliveryMode, DeliveryOutcome, Transport, TransportRequest};
pub use crate::error::{Error, SessionError, TransportError};
pub use crate::provider::{AnalyticsProvider, HostSignal, Provider};
pub use crate::queue::{DrainChunks, EventQueue};
pub use crate::scheduler::{FlushScheduler, FlushSummary, Flusher};
pub use crate::session::{ActiveSession, SessionController};
pub use crate::types::*;

pub mod config;
pub mod delivery;
pub mod error;
pub mod provider;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod types;

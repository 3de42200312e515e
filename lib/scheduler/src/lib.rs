//! Schedule handling for nusoma workers.
//!
//! A worker whose starter block is configured for scheduled runs gets a
//! single schedule row, reconciled on every save. This crate provides the
//! pure pieces of that pipeline:
//!
//! - **Config extraction**: reading structured schedule fields from a
//!   starter block's sub-blocks
//! - **Validation**: per-schedule-type checks for concrete time fields
//! - **Cron generation**: canonical 5-field cron expressions
//! - **Next-run calculation**: timezone-aware next occurrence search
//! - **Upsert planning**: the decision to upsert or remove a schedule row
//!
//! Everything here is pure and stateless; persistence lives in the server.

pub mod config;
pub mod cron;
pub mod error;
pub mod schedule;

pub use config::{
    ScheduleType, ScheduleValues, TimeFields, generate_cron_expression,
    has_valid_schedule_config,
};
pub use cron::{CronExpression, calculate_next_run_time};
pub use error::ScheduleError;
pub use schedule::{Schedule, ScheduleChange, ScheduleStatus, plan_schedule_change};

//! Core entities of the leasing-inquiry pipeline.
//!
//! These are plain data types shared by the queue, classifier, pipeline and
//! showing-booking modules. Persistence lives in `queue` and
//! `showing_service`; this module only carries shape and invariants that are
//! cheap to check in memory — the relational store enforces the rest via
//! constraints.

mod audit;
mod automation_rule;
mod availability;
mod conversation;
mod message;
mod platform_account;
mod showing;
mod template;

pub use audit::AuditLog;
pub use automation_rule::{select_rule, ActionType, AutomationRule, TriggerType};
pub use availability::{
    intervals_overlap, AgentAvailabilitySlot, AvailabilitySlot, SlotStatus, UnitAgentAssignment,
};
pub use conversation::{Conversation, ConversationStatus, WorkflowOutcome, WorkflowState};
pub use message::{
    DeliveryRecord, Direction, DispatchRecord, DispatchState, DlqReason, Message, RetryRecord,
};
pub use platform_account::{IntegrationMode, PlatformAccount, SendMode};
pub use showing::{AssignmentMode, ShowingAppointment, ShowingStatus};
pub use template::{resolve_template, Template};

use uuid::Uuid;

/// Opaque entity id. Every entity in §3 is keyed by this.
pub type EntityId = Uuid;

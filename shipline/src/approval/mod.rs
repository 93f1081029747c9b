//! Manual approval gates.

mod broker;

pub use broker::{
    ApprovalBroker, ApprovalDecision, ApprovalRecord, GateRequest, GateResolution,
    PendingApproval, PendingGate, Verdict,
};

//! Billing core: system loss, monthly bill generation, the payment ledger,
//! bill notices and collection reports.

pub mod error;
pub mod generation;
pub mod ledger;
pub mod month;
pub mod notice;
pub mod reports;
pub mod system_loss;

pub use error::BillingError;
pub use generation::{
    plan_generation, BillDraft, BillGenerationEngine, CarryOver, GenerationOutcome,
    GenerationPlan, NextMotherReading, PriorBillState, SkipReason, SkippedConsumer,
};
pub use ledger::{assess_payment, PaymentAssessment, PaymentLedger, PaymentReceipt, RecordPayment};
pub use notice::BillNotice;
pub use reports::{disconnection_candidates, income_summary, DisconnectionCandidate, IncomeSummary};
pub use system_loss::SystemLoss;

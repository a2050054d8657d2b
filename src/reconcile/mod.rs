//! 对账层：内容签名与 Reconciler

pub mod reconciler;
pub mod signature;

pub use reconciler::{CycleReport, Reconciler};
pub use signature::Signature;

/// Fake CRM
pub mod crm;

/// Failure-injecting local store
pub mod store;

pub use crm::{CrmOp, FakeCrm, RecordedCall};
pub use store::{FailableLocalStore, StoreOp};

mod approval_steps;
mod assign;
mod finalize;
mod open_workflow;
mod upsert;
mod validate;

pub use approval_steps::ApprovalStepsTask;
pub use assign::AssignCreativesTask;
pub use finalize::FinalizeSyncTask;
pub use open_workflow::OpenSyncWorkflowTask;
pub use upsert::UpsertCreativesTask;
pub use validate::ValidateBatchTask;

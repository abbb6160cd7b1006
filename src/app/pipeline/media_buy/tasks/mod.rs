mod adapter_create;
mod approval_gate;
mod associate;
mod build_packages;
mod finalize;
mod inline_creatives;
mod open_workflow;
mod persist;
mod pricing;
mod resolve_currency;
mod setup_gate;
mod validate;

pub use adapter_create::AdapterCreateTask;
pub use approval_gate::ApprovalGateTask;
pub use associate::AssociateCreativesTask;
pub use build_packages::BuildPackagesTask;
pub use finalize::FinalizeTask;
pub use inline_creatives::InlineCreativesTask;
pub(crate) use inline_creatives::asset_from_creative;
pub use open_workflow::OpenWorkflowTask;
pub use persist::PersistTask;
pub use pricing::PricingTask;
pub use resolve_currency::ResolveCurrencyTask;
pub use setup_gate::SetupGateTask;
pub use validate::ValidateRequestTask;

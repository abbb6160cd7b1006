mod engine;
mod webhooks;

pub use engine::{StepSpec, StepUpdate, WorkflowEngine};
pub use webhooks::WebhookDeliverer;

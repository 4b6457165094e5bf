pub mod deployment;
pub mod pod_template;
pub mod service_account;
pub mod task_pod;

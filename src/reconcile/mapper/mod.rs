pub mod deployment_to_service;
pub mod pod_to_task;

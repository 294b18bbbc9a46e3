//! Conversational EC2 operations client.
//!
//! Talks to the CloudWatch bot backend over HTTP and drives the chat
//! session, account/instance discovery, and the action wizards (agent
//! deployment, alarm configuration, instance type changes, GP2 to GP3
//! volume conversion).

pub mod agent;
pub mod alarms;
pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod health;
pub mod instance_type;
pub mod instances;
pub mod intent;
pub mod logging;
pub mod ui;
pub mod volumes;
pub mod workflow;

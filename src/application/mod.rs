// Pipeline stages
pub mod execution;
pub mod gate;
pub mod intents;
pub mod rules;
pub mod target;
pub mod universe;
pub mod valuation;

// Orchestrators
pub mod advisory;
pub mod batch;
pub mod engine;
pub mod simulation_service;

// Supportability substrate
pub mod async_ops;
pub mod idempotency;
pub mod policy;
pub mod support_bundle;

// Workflow
pub mod proposal_lifecycle;
pub mod workflow;

//! Orchestrator tests against a recording queue and mock host services

pub(crate) mod support;

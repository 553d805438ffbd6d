//! ---
//! dp_section: "15-testing-qa-runbook"
//! dp_subsection: "integration-tests"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Integration and validation tests for the provenance stack."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::any::Any;

use dp_core::DigitalProvenance;

#[test]
fn initialization() {
    let instance = DigitalProvenance::new();
    let erased: &dyn Any = &instance;
    assert!(erased.is::<DigitalProvenance>());
}

#[test]
fn run_method() {
    let instance = DigitalProvenance::new();
    assert!(instance.run());
}

#[test]
fn default_matches_new() {
    let instance = DigitalProvenance::default();
    assert!(instance.ledger().is_empty());
    assert!(instance.run());
}

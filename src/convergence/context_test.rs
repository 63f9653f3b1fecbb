use std::collections::BTreeSet;

use super::FailoverContext;
use crate::ConvergenceError;
use crate::Error;

fn members(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn new_primary_must_differ_from_old() {
    let mut context = FailoverContext::new("db-0:27017", 3);

    let err = context.record_new_primary("DB-0:27017").unwrap_err();
    assert!(matches!(err, Error::Verification(_)));
    assert_eq!(context.new_primary_id(), None);

    context.record_new_primary("db-1:27017").unwrap();
    assert_eq!(context.new_primary_id(), Some("db-1:27017"));
}

#[test]
fn live_members_cannot_exceed_configured_nodes() {
    let mut context = FailoverContext::new("db-0:27017", 2);

    let err = context
        .record_live_members(members(&["db-0:27017", "db-1:27017", "db-2:27017"]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Convergence(ConvergenceError::MembershipOverflow {
            observed: 3,
            configured: 2
        })
    ));
    assert!(context.live_members().is_empty());
}

#[test]
fn membership_restored_only_at_configured_count() {
    let mut context = FailoverContext::new("db-0:27017", 3);

    context
        .record_live_members(members(&["db-1:27017", "db-2:27017"]))
        .unwrap();
    assert!(!context.membership_restored());
    assert!(!context.old_primary_is_live());

    context
        .record_live_members(members(&["db-0:27017", "db-1:27017", "db-2:27017"]))
        .unwrap();
    assert!(context.membership_restored());
    assert!(context.old_primary_is_live());
}

mod support;

use except_runtime::{
    attempt, current_scope, define_exception_class, throw, Scope, EXCEPTION, THROWABLE,
};

define_exception_class!(L1 extends EXCEPTION);
define_exception_class!(L2 extends L1);
define_exception_class!(Unrelated extends EXCEPTION);

#[test]
fn subclass_is_caught_by_ancestor_clause() {
    let mut message = None;
    attempt! {
        try {
            throw!(L2);
        }
        catch (L1, e) {
            message = Some(e.message());
        }
        finally {}
    }
    let message = message.expect("the L1 clause catches L2");
    assert!(message.starts_with("L2: file \""), "got: {}", message);
    assert!(message.ends_with("."), "got: {}", message);
}

#[test]
fn first_matching_clause_wins() {
    let mut hits = Vec::new();
    attempt! {
        try {
            throw!(L2);
        }
        catch (Unrelated, _e) {
            hits.push("unrelated");
        }
        catch (L2, _e) {
            hits.push("exact");
        }
        catch (L1, _e) {
            hits.push("ancestor");
        }
        finally {
            hits.push("finally");
        }
    }
    assert_eq!(hits, vec!["exact", "finally"]);
}

#[test]
fn uncaught_exception_propagates_after_finally() {
    let mut order = Vec::new();
    attempt! {
        try {
            attempt! {
                try {
                    throw!(L2);
                }
                catch (Unrelated, _e) {
                    order.push("inner catch");
                }
                finally {
                    order.push("inner finally");
                }
            }
            order.push("unreached");
        }
        catch (L1, e) {
            assert_eq!(e.class().name(), "L2");
            order.push("outer catch");
        }
        finally {
            order.push("outer finally");
        }
    }
    assert_eq!(order, vec!["inner finally", "outer catch", "outer finally"]);
}

#[test]
fn rethrow_preserves_the_original_origin() {
    let mut first_message = None;
    let mut second_message = None;
    attempt! {
        try {
            attempt! {
                try {
                    throw!(L2);
                }
                catch (L1, e) {
                    first_message = Some(e.message());
                    throw!(e);
                }
                finally {}
            }
        }
        catch (THROWABLE, e) {
            second_message = Some(e.message());
        }
        finally {}
    }
    assert!(first_message.is_some());
    assert_eq!(first_message, second_message);
}

#[test]
fn thrown_data_reaches_the_catch() {
    let mut seen = None;
    attempt! {
        try {
            throw!(L1, 1234u64);
        }
        catch (L1, e) {
            seen = e.data().and_then(|d| d.downcast_ref::<u64>()).copied();
        }
        finally {}
    }
    assert_eq!(seen, Some(1234));
}

#[test]
fn finally_throw_overrules_pending_exception() {
    let mut caught = None;
    attempt! {
        try {
            attempt! {
                try {
                    throw!(L1);
                }
                finally {
                    throw!(Unrelated);
                }
            }
        }
        catch (L1, _e) {
            caught = Some("l1");
        }
        catch (Unrelated, _e) {
            caught = Some("unrelated");
        }
        finally {}
    }
    assert_eq!(caught, Some("unrelated"));
}

#[test]
fn finally_runs_exactly_once_on_every_path() {
    let mut count = 0;
    attempt! {
        try {}
        finally {
            count += 1;
        }
    }
    assert_eq!(count, 1);

    let mut count = 0;
    attempt! {
        try {
            throw!(L1);
        }
        catch (L1, _e) {}
        finally {
            count += 1;
        }
    }
    assert_eq!(count, 1);

    let mut count = 0;
    attempt! {
        try {
            attempt! {
                try {
                    throw!(L1);
                }
                finally {
                    count += 1;
                }
            }
        }
        catch (L1, _e) {}
        finally {}
    }
    assert_eq!(count, 1);
}

#[test]
fn foreign_panic_runs_finally_and_continues_unwinding() {
    let mut cleaned = false;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        attempt! {
            try {
                panic!("not an exception");
            }
            catch (THROWABLE, _e) {
                unreachable!("foreign panics are not catchable");
            }
            finally {
                cleaned = true;
            }
        }
    }));
    assert!(result.is_err());
    assert!(cleaned);
}

#[test]
fn scope_follows_the_active_block() {
    assert_eq!(current_scope(), Scope::Outside);
    attempt! {
        try {
            assert_eq!(current_scope(), Scope::Try);
            throw!(L1);
        }
        catch (L1, _e) {
            assert_eq!(current_scope(), Scope::Catch);
        }
        finally {
            assert_eq!(current_scope(), Scope::Finally);
        }
    }
    assert_eq!(current_scope(), Scope::Outside);
}

#[test]
fn lost_exception_is_reported_and_execution_continues() {
    let output = support::capture_diagnostics(|| {
        attempt! {
            try {
                throw!(L1);
            }
            catch (Unrelated, _e) {}
            finally {}
        }
    });
    assert!(output.contains("L1 lost: "), "got: {}", output);
}

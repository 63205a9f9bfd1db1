use except_runtime::{
    attempt, define_exception_class, return_scope, throw, try_return, EXCEPTION, THROWABLE,
};

define_exception_class!(Magic extends EXCEPTION);

fn early_return_with_empty_finally() -> i32 {
    return_scope(|| {
        attempt! {
            try {
                try_return!(6);
            }
            catch (THROWABLE, _e) {
                unreachable!("a deferred return is not catchable");
            }
            finally {}
        }
        0
    })
}

#[test]
fn deferred_return_skips_catch_and_produces_the_value() {
    assert_eq!(early_return_with_empty_finally(), 6);
}

fn finally_overrides_the_return() -> i32 {
    return_scope(|| {
        attempt! {
            try {
                try_return!(6);
            }
            catch (THROWABLE, _e) {}
            finally {
                try_return!(7);
            }
        }
        0
    })
}

#[test]
fn finally_return_overrules_an_earlier_return() {
    assert_eq!(finally_overrides_the_return(), 7);
}

fn nested_return(order: &mut Vec<&'static str>) -> i32 {
    return_scope(|| {
        attempt! {
            try {
                attempt! {
                    try {
                        attempt! {
                            try {
                                try_return!(1);
                            }
                            finally {
                                order.push("A");
                            }
                        }
                    }
                    finally {
                        order.push("B");
                    }
                }
            }
            finally {
                order.push("C");
            }
        }
        0
    })
}

#[test]
fn every_enclosing_finally_runs_in_order() {
    let mut order = Vec::new();
    assert_eq!(nested_return(&mut order), 1);
    assert_eq!(order, vec!["A", "B", "C"]);
}

fn catch_then_finally_override(output: &mut String) -> i32 {
    return_scope(|| {
        attempt! {
            try {
                attempt! {
                    try {
                        attempt! {
                            try {
                                throw!(Magic);
                            }
                            catch (Magic, _e) {
                                try_return!(1);
                            }
                            finally {
                                output.push('A');
                                try_return!(2);
                            }
                        }
                    }
                    catch (Magic, _e) {
                        output.push_str("Magic");
                    }
                    finally {
                        output.push('B');
                    }
                }
            }
            finally {
                output.push('C');
            }
        }
        0
    })
}

#[test]
fn finally_return_overrules_a_catch_return() {
    let mut output = String::new();
    assert_eq!(catch_then_finally_override(&mut output), 2);
    assert_eq!(output, "ABC");
}

fn inner_function(log: &mut Vec<&'static str>) -> i32 {
    return_scope(|| {
        attempt! {
            try {
                try_return!(5);
            }
            finally {
                log.push("inner finally");
            }
        }
        0
    })
}

#[test]
fn deferred_return_stops_at_its_function_boundary() {
    let mut log = Vec::new();
    let mut got = None;
    attempt! {
        try {
            got = Some(inner_function(&mut log));
        }
        finally {
            log.push("outer finally");
        }
    }
    assert_eq!(got, Some(5));
    assert_eq!(log, vec!["inner finally", "outer finally"]);
}

fn throwing_function() {
    attempt! {
        try {
            throw!(Magic);
        }
        finally {}
    }
}

#[test]
fn throws_cross_function_boundaries() {
    let mut caught = false;
    attempt! {
        try {
            throwing_function();
        }
        catch (Magic, _e) {
            caught = true;
        }
        finally {}
    }
    assert!(caught);
}

#[test]
fn deferred_return_works_without_a_try() {
    let v: i32 = return_scope(|| try_return!(9));
    assert_eq!(v, 9);
}

#[test]
#[should_panic(expected = "deferred return value does not have the return scope's type")]
fn mismatched_return_type_panics() {
    let _: i32 = return_scope(|| {
        attempt! {
            try {
                try_return!("six");
            }
            finally {}
        }
        0
    });
}

//! Debug-mode catch-list validation.
//!
//! At frame entry the catch clauses are inspected once per source site, with
//! no user code running: a clause naming the same class as an earlier one is
//! a duplicate, and a clause naming a subclass of an earlier one can never
//! match. Both are almost certainly mistakes, so they are reported on the
//! diagnostic channel. A `try` with no catch clauses at all gets a warning.

use crate::diagnostics;
use crate::frame::TrySite;
use crate::machine::ArmSpec;

pub(crate) fn check_catch_list(
    site: &'static TrySite,
    file: &'static str,
    line: u32,
    arms: &[ArmSpec],
) {
    if !site.begin_check() {
        return;
    }
    if arms.is_empty() {
        diagnostics::emit(format_args!("Warning: No catch clause(s): {}:{}", file, line));
        return;
    }
    for k in 1..arms.len() {
        for j in 0..k {
            if arms[k].class == arms[j].class {
                diagnostics::emit(format_args!(
                    "Duplicate catch({}): {}:{}; already caught at line {}",
                    arms[k].class.name(),
                    file,
                    arms[k].line,
                    arms[j].line
                ));
            } else if arms[k].class.is_derived(arms[j].class) {
                diagnostics::emit(format_args!(
                    "Superfluous catch({}): {}:{}; already caught by {} at line {}",
                    arms[k].class.name(),
                    file,
                    arms[k].line,
                    arms[j].class.name(),
                    arms[j].line
                ));
            }
        }
    }
}

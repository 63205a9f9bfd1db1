use except_runtime::{attempt, thread_identity, throw, EXCEPTION, THROWABLE};

fn line_number(trace_line: &str) -> u32 {
    trace_line
        .rsplit(':')
        .next()
        .and_then(|n| n.parse().ok())
        .expect("a trace line ends with a line number")
}

#[test]
fn trace_lists_frames_innermost_first() {
    let mut trace = None;
    attempt! {
        try {
            attempt! {
                try {
                    throw!(EXCEPTION);
                }
                catch (THROWABLE, e) {
                    let mut buf = Vec::new();
                    e.print_try_trace(&mut buf).expect("writes to a Vec succeed");
                    trace = Some(String::from_utf8(buf).unwrap());
                }
                finally {}
            }
        }
        finally {}
    }
    let trace = trace.unwrap();
    let lines: Vec<&str> = trace.lines().collect();
    assert_eq!(lines.len(), 3, "got: {}", trace);
    assert_eq!(
        lines[0],
        format!("Exception occurred in thread {}:", thread_identity())
    );
    assert!(lines[1].starts_with("        in 'try' at "), "got: {}", lines[1]);
    assert!(lines[2].starts_with("        in 'try' at "), "got: {}", lines[2]);
    // the inner try appears first, and it sits further down this source file
    assert!(line_number(lines[1]) > line_number(lines[2]));
}

#[test]
fn message_names_the_class_and_site() {
    let mut message = None;
    attempt! {
        try {
            throw!(EXCEPTION);
        }
        catch (THROWABLE, e) {
            message = Some(e.message());
        }
        finally {}
    }
    let message = message.unwrap();
    assert!(message.starts_with("Exception: file \""), "got: {}", message);
    assert!(message.contains("trace.rs"), "got: {}", message);
}

use crate::harness::TestSession;

#[test]
fn a_changed_watch_halts_and_reports_both_values() {
    let mut t = TestSession::new(&["n", "w $x", "c", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(5));
    let output = t.output();
    assert!(
        output.contains("Watchpoint 0:\t$x changed:\n    old value:\t'1'\n    new value:\t'2'\n"),
        "{output}"
    );
    let last = t.session(|s| s.watches().entries()[0].last_value.clone());
    assert_eq!(last, "2");
}

#[test]
fn listing_and_deleting_watches() {
    let mut t = TestSession::new(&["n", "w $x", "w $y", "w", "W $x", "L w", "W *", "w", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("Watch-expressions:\n $x = '1'\n $y = 'undef'\n"), "{output}");
    assert!(output.contains("Watch-expressions:\n $y = 'undef'\n"), "{output}");
    assert!(output.contains("Deleting all watch expressions ..."), "{output}");
    assert!(output.contains("No watch expressions."), "{output}");
    assert!(t.session(|s| s.watches().is_empty()));
}

#[test]
fn deleting_an_unknown_watch_is_an_error() {
    let mut t = TestSession::new(&["W $nope", "q"]);
    t.run();
    assert!(t.output().contains("No such watch expression: $nope"), "{}", t.output());
}

#[test]
fn a_failing_watch_is_reported_once() {
    let mut t = TestSession::new(&["w $bad", "c", "q"]);
    t.host.fail_on("$bad", "boom");
    t.run();
    let output = t.output();
    assert_eq!(output.matches("Watch expression '$bad' failed: boom").count(), 1, "{output}");
    // A failure never forces a halt.
    assert_eq!(t.halts(), 2);
}

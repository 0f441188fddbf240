use crate::harness::TestSession;
use sdb_core::{FileId, Value};

#[test]
fn conditional_breakpoints_halt_only_when_true() {
    let mut t = TestSession::new(&["b 2 $x == 5", "b 4 $y == 3", "c", "q"]);
    t.run();
    assert_eq!(t.halts(), 2);
    assert_eq!(t.halted_at(), Some(4));
}

#[test]
fn failing_condition_is_reported_and_does_not_halt() {
    let mut t = TestSession::new(&["b 2 die 'broken'", "c", "q"]);
    assert_eq!(t.run(), 0);
    let output = t.output();
    assert_eq!(
        output.matches("Error in breakpoint condition at main.pl:2: broken").count(),
        1,
        "{output}"
    );
    // The start and the end of the program.
    assert_eq!(t.halts(), 2);
}

#[test]
fn actions_run_without_halting() {
    let mut t = TestSession::new(&["a 4 $w = 7", "c", "q"]);
    t.run();
    assert_eq!(t.halts(), 2);
    assert_eq!(t.host.get("$w"), Value::scalar("7"));
}

#[test]
fn list_all_shows_stops_and_actions() {
    let mut t = TestSession::new(&["b 4", "a 5 $w = 1", "b 10 $y > 2", "L", "q"]);
    t.run();
    let output = t.output();
    assert!(
        output.contains(
            "main.pl:\n 4:\t$x = $x + 1;\n   break if (1)\n 5:\tprint $x;\n   action:  $w = 1\n 10:\t    $y = $y + 1;\n   break if ($y > 2)\n"
        ),
        "{output}"
    );
}

#[test]
fn unbreakable_lines_are_refused() {
    let mut t = TestSession::new(&["b 6", "a 8 $w = 1", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("Line 6 not breakable."), "{output}");
    assert!(output.contains("Line 8 not breakable."), "{output}");
    assert!(t.session(|s| s.breakpoints().is_empty()));
}

#[test]
fn deleting_every_breakpoint() {
    let mut t = TestSession::new(&["b 4", "b 5", "B *", "c", "q"]);
    t.run();
    assert!(t.output().contains("Deleting all breakpoints..."));
    assert!(t.session(|s| s.breakpoints().is_empty()));
    assert!(t.session(|s| s.is_finished()));
}

#[test]
fn deleting_a_missing_breakpoint_is_an_error() {
    let mut t = TestSession::new(&["B 4", "q"]);
    t.run();
    assert!(t.output().contains("No breakpoint at line 4."), "{}", t.output());
}

#[test]
fn continue_to_a_line_with_a_false_condition_still_halts() {
    let mut t = TestSession::new(&["b 4 $x == 99", "c 4", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(4));
    let condition = t.session(|s| {
        s.breakpoints()
            .get(&FileId::new("main.pl"), 4)
            .and_then(|entry| entry.condition().map(str::to_owned))
    });
    assert_eq!(condition.as_deref(), Some("$x == 99"));
}

#[test]
fn continue_to_an_existing_stop_keeps_it() {
    let mut t = TestSession::new(&["b 4", "c 4", "L b", "c", "q"]);
    t.run();
    assert_eq!(t.halts(), 3);
    let entry = t.session(|s| s.breakpoints().get(&FileId::new("main.pl"), 4).cloned());
    let entry = entry.expect("stop on line 4 survives");
    assert!(entry.stop.is_some());
    assert!(!entry.one_shot);
    let output = t.output();
    assert!(output.contains(" 4:\t$x = $x + 1;\n   break if (1)\n"), "{output}");
    assert!(!output.contains("break once"), "{output}");
}

#[test]
fn continue_to_a_bare_line_leaves_nothing_behind() {
    let mut t = TestSession::new(&["b 2", "c", "c 5", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(5));
    assert!(t.session(|s| s.breakpoints().get(&FileId::new("main.pl"), 5).is_none()));
}

#[test]
fn breakpoint_on_a_subroutine() {
    let mut t = TestSession::new(&["b bump", "c", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(10));
    assert!(t.session(|s| s.breakpoints().get(&FileId::new("main.pl"), 10).is_some()));
}

#[test]
fn unknown_subroutines_are_reported() {
    let mut t = TestSession::new(&["b nosuch", "q"]);
    t.run();
    assert!(t.output().contains("Subroutine nosuch not found."), "{}", t.output());
}

use crate::harness::{banner, config, TestSession};
use sdb_core::{SessionConfig, StepMode, Value};

#[test]
fn stops_before_the_first_statement() {
    let mut t = TestSession::new(&["q"]);
    assert_eq!(t.run(), 0);
    assert_eq!(t.halted_at(), Some(1));
    assert!(t.output().starts_with(&format!("{}\n  DB<1> ", banner(1))), "{}", t.output());
}

#[test]
fn step_into_enters_subroutines() {
    let mut t = TestSession::new(&["s", "s", "s", "s", "q"]);
    t.run();
    assert_eq!(t.halts(), 5);
    assert_eq!(t.halted_at(), Some(11));
    assert_eq!(t.session(|s| s.depth()), 2);
    let output = t.output();
    assert!(output.contains(&banner(10)), "{output}");
}

#[test]
fn step_over_runs_calls_without_halting() {
    let mut t = TestSession::new(&["n", "n", "n", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(4));
    assert!(!t.output().contains(&banner(10)));
    assert_eq!(t.host.get("$y"), Value::scalar("3"));
}

#[test]
fn empty_line_repeats_the_last_step() {
    let mut t = TestSession::new(&["s", "", "", "q"]);
    t.run();
    assert_eq!(t.halts(), 4);
    assert_eq!(t.halted_at(), Some(10));
    let log = t.session(|s| s.history().true_log().to_vec());
    assert_eq!(log, vec!["s".to_owned(), "q".to_owned()]);
}

#[test]
fn empty_line_without_a_previous_step_does_nothing() {
    let mut t = TestSession::new(&["", "q"]);
    t.run();
    assert_eq!(t.halts(), 1);
    assert_eq!(t.halted_at(), Some(1));
}

#[test]
fn stepping_from_a_breakpoint_keeps_the_call_depth() {
    let mut t = TestSession::new(&["b 10", "c", "s", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(11));
    assert_eq!(t.session(|s| s.depth()), 2);
    assert_eq!(t.session(|s| s.step_mode()), StepMode::StepInto);
}

#[test]
fn return_halts_in_the_caller() {
    let mut t = TestSession::new(&["b 10", "c", "r", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(4));
    assert_eq!(t.session(|s| s.depth()), 1);
    assert!(!t.output().contains(&banner(11)));
}

#[test]
fn continue_to_a_line_stops_once() {
    let mut t = TestSession::new(&["c 5", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(5));
    assert!(t.session(|s| s.breakpoints().is_empty()));
}

#[test]
fn continue_to_a_subroutine_stops_at_its_first_statement() {
    let mut t = TestSession::new(&["c bump", "q"]);
    t.run();
    assert_eq!(t.halted_at(), Some(10));
}

#[test]
fn continue_to_an_unbreakable_line_is_refused() {
    let mut t = TestSession::new(&["c 6", "q"]);
    t.run();
    assert_eq!(t.halts(), 1);
    assert!(t.output().contains("Line 6 not breakable."), "{}", t.output());
}

#[test]
fn program_end_enters_the_command_loop_once_more() {
    let mut t = TestSession::new(&["c", "s", "q"]);
    assert_eq!(t.run(), 0);
    assert_eq!(t.halts(), 2);
    assert!(t.session(|s| s.is_finished()));
    let output = t.output();
    assert!(
        output.contains("Debugged program terminated.  Use q to quit or R to restart,\n"),
        "{output}"
    );
    assert!(
        output.contains("Debugged program terminated.  Use q to quit or R to restart.\n"),
        "{output}"
    );
    assert_eq!(t.program_output.text(), "2\n");
}

#[test]
fn quit_reports_the_program_exit_status() {
    let mut t = TestSession::with_program(config(), "$x = 1;\nexit 3;\n", &["c", "q"]);
    assert_eq!(t.run(), 3);
}

#[test]
fn without_inhibit_exit_the_session_ends_with_the_program() {
    let config = SessionConfig {
        inhibit_exit: false,
        ..config()
    };
    let mut t = TestSession::with_config(config, &["c"]);
    assert_eq!(t.run(), 0);
    assert_eq!(t.halts(), 1);
    assert!(!t.output().contains("Debugged program terminated."));
}

#[test]
fn non_stop_sessions_never_halt() {
    let config = SessionConfig {
        non_stop: true,
        ..config()
    };
    let mut t = TestSession::with_config(config, &["q"]);
    assert_eq!(t.run(), 0);
    assert_eq!(t.halts(), 0);
    assert_eq!(t.output(), "");
    assert_eq!(t.program_output.text(), "2\n");
}

#[test]
fn stop_at_start_off_runs_to_the_first_breakpoint_or_the_end() {
    let config = SessionConfig {
        stop_at_start: false,
        ..config()
    };
    let mut t = TestSession::with_config(config, &["q"]);
    t.run();
    // Only the end-of-program halt.
    assert_eq!(t.halts(), 1);
    assert!(t.session(|s| s.is_finished()));
}

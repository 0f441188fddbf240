use crate::harness::TestSession;
use pretty_assertions::assert_eq;
use sdb_core::alias::AliasDefinition;
use sdb_core::breakpoints::{Breakpoint, StopCondition};
use sdb_core::restart::SavedBreakpoint;
use sdb_core::{FileId, RestartState, RESTART_FAILED_STATUS, RESTART_STATE_ENV_VAR};

#[test]
fn restart_without_a_command_line_ends_the_session() {
    let mut t = TestSession::new(&["b 4", "R", "p 1"]);
    assert_eq!(t.run(), RESTART_FAILED_STATUS);
    let output = t.output();
    assert!(
        output.contains("restart failed: the original command line is unknown"),
        "{output}"
    );
    assert!(!output.contains("\n1\n"), "{output}");
}

#[test]
fn rerun_checks_the_history_range() {
    let mut t = TestSession::new(&["rerun 10", "q"]);
    assert_eq!(t.run(), 0);
    assert!(
        t.output().contains("Cannot rerun to command 10: history has 1 commands."),
        "{}",
        t.output()
    );
}

#[test]
fn rerun_restarts() {
    let mut t = TestSession::new(&["p 1", "rerun 0"]);
    assert_eq!(t.run(), RESTART_FAILED_STATUS);
}

#[test]
fn restart_state_is_picked_up_by_the_next_session() {
    let state = RestartState {
        breakpoints: vec![SavedBreakpoint {
            file: FileId::new("main.pl"),
            line: 4,
            breakpoint: Breakpoint {
                stop: Some(StopCondition::Always),
                action: None,
                one_shot: false,
            },
        }],
        aliases: vec![AliasDefinition {
            name: "ll".to_owned(),
            value: "l 1-3".to_owned(),
        }],
        history: vec!["b 4".to_owned()],
        typeahead: vec!["p 9".to_owned()],
        ..RestartState::default()
    };
    let path = state.write_handover().unwrap();
    std::env::set_var(RESTART_STATE_ENV_VAR, &path);

    let mut t = TestSession::resumed(&["c", "q"]);
    assert!(std::env::var_os(RESTART_STATE_ENV_VAR).is_none());
    assert!(!path.exists());

    t.run();
    assert_eq!(t.halted_at(), Some(4));
    let output = t.output();
    // Typeahead is echoed and runs before anything else.
    assert!(output.contains("  DB<2> p 9\n9\n"), "{output}");
    assert!(t.session(|s| s.aliases().get("ll").is_some()));
    let log = t.session(|s| s.history().true_log().to_vec());
    assert_eq!(log, vec!["b 4", "p 9", "c", "q"]);
}

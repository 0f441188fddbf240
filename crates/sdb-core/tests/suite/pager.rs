use crate::harness::{config, TestSession};
use sdb_core::SessionConfig;

#[test]
fn session_only_pipe_sends_command_output_to_the_pager() {
    let mut t = TestSession::new(&["|| p 42", "p 43", "q"]);
    t.run();
    let output = t.output();
    assert!(!output.contains("42"), "{output}");
    assert!(output.contains("43\n"), "{output}");
}

#[test]
fn pager_launch_failure_is_reported_once_and_output_stays_direct() {
    let config = SessionConfig {
        pager: "/nonexistent/sdb-pager".to_owned(),
        ..config()
    };
    let mut t = TestSession::with_config(config, &["|| p 42", "p 43", "q"]);
    assert_eq!(t.run(), 0);
    let output = t.output();
    assert_eq!(
        output.matches("Can't run pager `/nonexistent/sdb-pager`").count(),
        1,
        "{output}"
    );
    assert!(!output.contains("42"), "{output}");
    assert!(output.contains("43\n"), "{output}");
}

#[cfg(unix)]
#[test]
fn full_pipe_restores_direct_output_after_the_command() {
    let mut t = TestSession::new(&["| p 41", "p 43", "q"]);
    assert_eq!(t.run(), 0);
    let output = t.output();
    assert!(!output.contains("41"), "{output}");
    assert!(output.contains("43\n"), "{output}");
    assert!(!t.session(|s| s.is_piped()), "{output}");
}

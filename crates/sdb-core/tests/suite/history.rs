use crate::harness::TestSession;
use pretty_assertions::assert_eq;

#[test]
fn recall_by_number_and_by_prefix() {
    let mut t = TestSession::new(&["p 1", "p 2", "!0", "!p", "H", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("3: p 1\n2: p 1\n1: p 2\n0: p 1\n"), "{output}");
    let log = t.session(|s| s.history().true_log().to_vec());
    assert_eq!(log, vec!["p 1", "p 2", "p 1", "p 1", "H", "q"]);
}

#[test]
fn recall_misses_are_reported() {
    let mut t = TestSession::new(&["!zz", "!99", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("No command starting with 'zz' found."), "{output}");
    assert!(output.contains("No such command in history."), "{output}");
    let log = t.session(|s| s.history().true_log().to_vec());
    assert_eq!(log, vec!["q"]);
}

#[test]
fn out_of_range_numbers_are_reported_not_fatal() {
    let recall = format!("!-{}", usize::MAX);
    let rerun = format!("rerun {}", i64::MAX);
    let mut t = TestSession::new(&[&recall, &rerun, "q"]);
    assert_eq!(t.run(), 0);
    let output = t.output();
    assert!(output.contains("No such command in history."), "{output}");
    assert!(
        output.contains(&format!("Cannot rerun to command {}: history has 1 commands.", i64::MAX)),
        "{output}"
    );
}

#[test]
fn prompt_counts_display_entries() {
    let mut t = TestSession::new(&["p 1", "s", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("  DB<1> "), "{output}");
    assert!(output.contains("  DB<2> "), "{output}");
    // `s` is too short for the display log.
    assert!(!output.contains("  DB<3> "), "{output}");
}

#[test]
fn clearing_history() {
    let mut t = TestSession::new(&["p 1", "H -c", "q"]);
    t.run();
    assert!(t.output().contains("History cleared."));
    let log = t.session(|s| s.history().true_log().to_vec());
    assert_eq!(log, vec!["q"]);
}

#[test]
fn saved_history_replays_with_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmds.sdb");
    let path = path.to_str().unwrap().to_owned();

    let save = format!("save {path}");
    let mut first = TestSession::new(&["b 4", "p 5", &save, "q"]);
    first.run();
    assert!(first.output().contains(&format!("commands saved in {path}")));
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, format!("b 4\np 5\n# save {path}\n"));

    let source = format!("source {path}");
    let mut second = TestSession::new(&[&source, "c", "q"]);
    second.run();
    assert_eq!(second.halted_at(), Some(4));
    let output = second.output();
    // Sourced commands are echoed after the prompt.
    assert!(output.contains("  DB<2> b 4\n"), "{output}");
    assert!(output.contains("5\n"), "{output}");
}

#[test]
fn sourcing_a_missing_file_is_reported() {
    let mut t = TestSession::new(&["source /nonexistent/sdb-commands", "q"]);
    t.run();
    assert!(
        t.output().contains("Can't open /nonexistent/sdb-commands:"),
        "{}",
        t.output()
    );
}

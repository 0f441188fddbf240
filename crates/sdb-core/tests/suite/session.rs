use crate::harness::{banner, config, TestSession};
use pretty_assertions::assert_eq;
use sdb_core::{SessionConfig, Value};

#[test]
fn trace_mode_prints_every_statement() {
    let mut t = TestSession::new(&["t", "c", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("Trace = on"), "{output}");
    for line in [2, 3, 10, 11, 4, 5, 7] {
        assert!(output.contains(&banner(line)), "line {line} missing: {output}");
    }
    assert_eq!(t.halts(), 2);
    assert!(t.session(|s| s.is_tracing()));
}

#[test]
fn print_dump_and_plain_expressions() {
    let mut t = TestSession::new(&["p $x", "x 'a'", "$q = 5", "p", "p $q + 1", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("  DB<1> undef\n"), "{output}");
    assert!(output.contains("0  'a'\n"), "{output}");
    assert!(output.contains("6\n"), "{output}");
    assert_eq!(t.host.get("$q"), Value::scalar("5"));
}

#[test]
fn expression_errors_are_shown() {
    let mut t = TestSession::new(&["die 'oops'", "q"]);
    t.run();
    assert!(t.output().contains("oops\n"), "{}", t.output());
}

#[test]
fn multi_line_commands_continue_with_backslash() {
    let mut t = TestSession::new(&["p \\", "7", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("  cont: "), "{output}");
    assert!(output.contains("7\n"), "{output}");
}

#[test]
fn options_are_shown_and_changed() {
    let mut t = TestSession::new(&[
        "o window_size=3",
        "o window_size?",
        "o bogus",
        "o window_size=0",
        "o pager=\"less -R\"",
        "q",
    ]);
    t.run();
    let output = t.output();
    assert_eq!(output.matches("    window_size = '3'\n").count(), 2, "{output}");
    assert!(output.contains("unknown option `bogus`"), "{output}");
    assert!(output.contains("invalid value `0` for option `window_size`"), "{output}");
    assert!(output.contains("pager = 'less -R'"), "{output}");
    assert_eq!(t.session(|s| s.config().window_size), 3);
}

#[test]
fn setting_non_stop_lets_the_program_run() {
    let mut t = TestSession::new(&["o non_stop", "c", "q"]);
    assert_eq!(t.run(), 0);
    // non_stop also skips the end-of-program halt.
    assert_eq!(t.halts(), 1);
}

#[test]
fn prompt_expressions_run_around_the_command_loop() {
    let mut t = TestSession::new(&["< $pre = $pre + 1", "> $post = 7", "<", "n", "q"]);
    t.run();
    let output = t.output();
    assert!(
        output.contains("Expressions run before each prompt:\n\t< -- $pre = $pre + 1\n"),
        "{output}"
    );
    assert_eq!(t.host.get("$pre"), Value::scalar("1"));
    assert_eq!(t.host.get("$post"), Value::scalar("7"));
    assert_eq!(t.session(|s| s.pre_prompt().to_vec()), vec!["$pre = $pre + 1"]);
}

#[test]
fn appending_and_clearing_prompt_expressions() {
    let mut t = TestSession::new(&[">> $a = 1", ">> $b = 2", "> ?", "> *", ">", "q"]);
    t.run();
    let output = t.output();
    assert!(
        output.contains("Expressions run after each prompt:\n\t> -- $a = 1\n\t> -- $b = 2\n"),
        "{output}"
    );
    assert!(output.contains("No expressions to run after the prompt."), "{output}");
}

#[test]
fn variables_lexicals_and_methods() {
    let mut t = TestSession::new(&["X count", "V other", "y 5", "m $obj", "q"]);
    t.host.set("$count", Value::scalar("3"));
    t.host.methods = vec!["new".to_owned(), "run".to_owned()];
    t.run();
    let output = t.output();
    assert!(output.contains("$count = 3\n"), "{output}");
    assert!(output.contains("Level 5 is deeper than the call stack"), "{output}");
    assert!(output.contains("new\nrun\n"), "{output}");
}

#[test]
fn threaded_programs_show_the_thread_in_the_prompt() {
    let mut t = TestSession::new(&["q"]);
    t.host.thread_id = Some(2);
    t.run();
    assert!(t.output().contains("[tid 2]  DB<1> "), "{}", t.output());
}

#[test]
fn help_lists_commands() {
    let mut t = TestSession::new(&["h", "h c", "h zz", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("Continue, optionally up to a line or subroutine"), "{output}");
    assert!(output.contains("Restart the program, keeping debugger state"), "{output}");
    assert!(output.contains("No help for 'zz'."), "{output}");
}

#[test]
fn shell_and_documentation_failures_are_reported() {
    let config = SessionConfig {
        doc_command: "/nonexistent/sdb-doc".to_owned(),
        ..config()
    };
    let mut t = TestSession::with_config(config, &["!! exit 3", "man", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("exited with exit status: 3"), "{output}");
    assert!(output.contains("failed to run `/nonexistent/sdb-doc sdb`"), "{output}");
}

#[test]
fn end_of_input_quits() {
    let mut t = TestSession::new(&[]);
    assert_eq!(t.run(), 0);
    assert_eq!(t.halts(), 1);
}

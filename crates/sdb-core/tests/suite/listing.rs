use crate::harness::{config, TestSession};
use sdb_core::SessionConfig;

fn small_window() -> SessionConfig {
    SessionConfig {
        window_size: 3,
        ..config()
    }
}

#[test]
fn listing_marks_the_current_line_and_moves_on() {
    let mut t = TestSession::with_config(small_window(), &["b 4", "a 5 $w = 1", "l", "l", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("1==>\t$x = 1;\n2:\t$y = 2;\n3:\tbump();\n"), "{output}");
    assert!(output.contains("4:b\t$x = $x + 1;\n5:a\tprint $x;\n6 \t# done\n"), "{output}");
}

#[test]
fn listing_ranges_and_subroutines() {
    let mut t = TestSession::with_config(small_window(), &["l 7", "l 2+1", "l bump", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("7:\t$z = 3;\n"), "{output}");
    assert!(output.contains("2:\t$y = 2;\n3:\tbump();\n"), "{output}");
    assert!(output.contains("9 \tsub bump {\n10:\t    $y = $y + 1;\n11:\t    return $y;\n"), "{output}");
}

#[test]
fn window_and_scroll_back() {
    let mut t = TestSession::with_config(small_window(), &["v 10", "-", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("9 \tsub bump {\n10:\t    $y = $y + 1;\n11:\t    return $y;\n"), "{output}");
    assert!(output.contains("6 \t# done\n7:\t$z = 3;\n8 \t\n"), "{output}");
}

#[test]
fn dot_shows_the_halted_line_again() {
    let mut t = TestSession::with_config(small_window(), &["l 9-11", ".", "q"]);
    t.run();
    let output = t.output();
    assert_eq!(output.matches(&crate::harness::banner(1)).count(), 2, "{output}");
}

#[test]
fn searches_wrap_and_ignore_case() {
    let mut t = TestSession::new(&["/PRINT/", "?bump?", "//", "/nothing here/", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("5:\tprint $x;\n"), "{output}");
    assert!(output.contains("3:\tbump();\n"), "{output}");
    assert!(output.contains("/nothing here/: not found"), "{output}");
}

#[test]
fn switching_to_an_unknown_file() {
    let mut t = TestSession::new(&["f nosuch.pl", "f main", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("No file matching 'nosuch.pl' is loaded."), "{output}");
    assert!(output.contains("1==>\t$x = 1;\n"), "{output}");
}

#[test]
fn stack_trace_lists_callers() {
    let mut t = TestSession::new(&["b 10", "c", "T", "q"]);
    t.run();
    let output = t.output();
    assert!(
        output.contains(". = main::bump called from file 'main.pl' line 3\n"),
        "{output}"
    );
}

#[test]
fn subroutine_listing_filters() {
    let mut t = TestSession::with_program(
        config(),
        "one();\ntwo();\n\nsub one {\n    $a = 1;\n}\nsub two {\n    $b = 2;\n}\n",
        &["S", "S !one", "q"],
    );
    t.run();
    let output = t.output();
    assert!(output.contains("main::one\nmain::two\n"), "{output}");
    assert!(output.contains("  DB<1> main::two\n"), "{output}");
}

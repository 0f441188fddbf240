use crate::harness::TestSession;

#[test]
fn plain_alias_rewrites_the_first_word() {
    let mut t = TestSession::new(&["= ll l 1-3", "ll", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("ll\t= l 1-3\n"), "{output}");
    assert!(output.contains("1==>\t$x = 1;\n2:\t$y = 2;\n3:\tbump();\n"), "{output}");
}

#[test]
fn substitution_alias_uses_captures() {
    let mut t = TestSession::new(&["= pp s/^pp(.*)/p$1/", "pp 7", "= pp", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("7\n"), "{output}");
    assert!(output.contains("pp\t= s/^pp(.*)/p$1/\n"), "{output}");
}

#[test]
fn substitution_alias_that_needs_an_argument() {
    let mut t = TestSession::new(&[r"= len s/^len\s+(\S+)/p $1/", "len 42", "q"]);
    t.run();
    let output = t.output();
    assert!(!output.contains("Cannot install alias"), "{output}");
    assert!(output.contains("42\n"), "{output}");
    assert!(t.session(|s| s.aliases().get("len").is_some()));
}

#[test]
fn broken_aliases_are_rejected() {
    let mut t = TestSession::new(&["= bad s/(/x/", "= ref s/^ref/p $2/", "bad", "q"]);
    t.run();
    let output = t.output();
    assert!(output.contains("Cannot install alias `bad`:"), "{output}");
    assert!(output.contains("Cannot install alias `ref`: replacement refers to missing capture group `2`"), "{output}");
    // `bad` falls through to the expression evaluator.
    assert!(output.contains("syntax error near \"bad\""), "{output}");
    assert!(t.session(|s| s.aliases().is_empty()));
}

#[test]
fn unknown_alias_lookup() {
    let mut t = TestSession::new(&["= nope", "q"]);
    t.run();
    assert!(t.output().contains("nope is not an alias"), "{}", t.output());
}

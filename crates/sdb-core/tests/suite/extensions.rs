use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::harness::TestSession;
use sdb_core::{CommandHandler, Handled};

struct Greeter {
    inits: Arc<AtomicUsize>,
}

impl CommandHandler for Greeter {
    fn handle(&mut self, _command: &str, out: &mut dyn Write) -> Handled {
        let _ = writeln!(out, "hi there");
        Handled::Continue
    }

    fn after_init(&mut self, out: &mut dyn Write) {
        self.inits.fetch_add(1, Ordering::SeqCst);
        let _ = writeln!(out, "greeter ready");
    }
}

#[test]
fn extension_commands_run_before_builtins() {
    let inits = Arc::new(AtomicUsize::new(0));
    let mut t = TestSession::new(&["hello", "p 5", "go", "q"]);
    t.debugger.register_command("hello", Box::new(Greeter { inits: inits.clone() }));
    t.debugger
        .register_command("p", Box::new(|_: &str, _: &mut dyn Write| Handled::NotConsumed));
    t.debugger
        .register_command("go", Box::new(|_: &str, _: &mut dyn Write| Handled::Stop));
    t.run();

    let output = t.output();
    assert!(output.contains("hi there\n"), "{output}");
    assert!(output.contains("5\n"), "{output}");
    assert_eq!(output.matches("greeter ready").count(), 1, "{output}");
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    // `go` resumed without changing the step mode.
    assert_eq!(t.halted_at(), Some(2));
    assert_eq!(t.halts(), 2);
}

#[test]
fn watch_function_can_wave_statements_through() {
    let mut t = TestSession::new(&["b 4", "c", "q"]);
    t.debugger
        .set_watch_function(Some(Box::new(|_: &str, _: &sdb_core::FileId, _: u32| true)));
    t.run();
    // The start, where the session was stepping, and the end.
    assert_eq!(t.halts(), 2);
    assert!(t.session(|s| !s.breakpoints().is_empty()));
}

#[test]
fn an_interrupt_halts_at_the_next_statement() {
    let mut t = TestSession::new(&["c", "q"]);
    let signal = t.debugger.signal();
    t.debugger.set_watch_function(Some(Box::new(
        move |_: &str, _: &sdb_core::FileId, line: u32| {
            if line == 4 {
                signal.raise();
            }
            true
        },
    )));
    t.run();
    assert_eq!(t.halted_at(), Some(5));
    assert!(!t.debugger.signal().is_raised());
}

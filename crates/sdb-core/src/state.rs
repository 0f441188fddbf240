//! Stepping state carried from one statement boundary to the next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Never halt on our own (non-stop mode); only interrupts stop.
    Run,
    /// Halt at the next statement, including inside called subroutines.
    StepInto,
    /// Halt at the next statement at this call depth or shallower.
    StepOver,
    /// Halt only at breakpoints, watch changes and interrupts.
    ContinueToBreakpoint,
}

bitflags! {
    /// Stepping bits of one call frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        const STEP_INTO = 0b01;
        const STEP_OVER = 0b10;
    }
}

impl FrameFlags {
    const STEPPING: Self = Self::STEP_INTO.union(Self::STEP_OVER);
}

/// Pending asynchronous interrupt. Cloned into signal handlers and into the
/// output router, which raises it when a pager goes away.
#[derive(Debug, Clone, Default)]
pub struct SignalFlag(Arc<AtomicBool>);

impl SignalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

#[derive(Debug)]
pub struct ExecutionState {
    /// One entry per active call frame; the last one is the current frame.
    frames: Vec<FrameFlags>,
    non_stop: bool,
    pub trace: bool,
    pub finished: bool,
    /// Whether the previous halt was caused by an interrupt.
    pub last_signal: bool,
    pub signal: SignalFlag,
}

impl ExecutionState {
    pub fn new(stop_at_start: bool, non_stop: bool, signal: SignalFlag) -> Self {
        let initial = if stop_at_start && !non_stop {
            FrameFlags::STEP_INTO
        } else {
            FrameFlags::empty()
        };
        Self {
            frames: vec![initial],
            non_stop,
            trace: false,
            finished: false,
            last_signal: false,
            signal,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[FrameFlags] {
        &self.frames
    }

    fn current(&self) -> FrameFlags {
        self.frames.last().copied().unwrap_or_default()
    }

    fn current_mut(&mut self) -> &mut FrameFlags {
        if self.frames.is_empty() {
            self.frames.push(FrameFlags::empty());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn set_non_stop(&mut self, non_stop: bool) {
        self.non_stop = non_stop;
    }

    pub fn is_non_stop(&self) -> bool {
        self.non_stop
    }

    pub fn step_mode(&self) -> StepMode {
        let current = self.current();
        if current.contains(FrameFlags::STEP_INTO) {
            StepMode::StepInto
        } else if current.contains(FrameFlags::STEP_OVER) {
            StepMode::StepOver
        } else if self.non_stop {
            StepMode::Run
        } else {
            StepMode::ContinueToBreakpoint
        }
    }

    /// Follow the program to call depth `depth` (1 = outermost).
    ///
    /// Entering a subroutine gives the new frame only the step-into bit of its
    /// caller, so stepping over a call does not halt inside it. Returning
    /// restores the caller's bits as they were when it made the call.
    pub fn sync_depth(&mut self, depth: usize) {
        let depth = depth.max(1);
        if depth < self.frames.len() {
            self.frames.truncate(depth);
        }
        while self.frames.len() < depth {
            let inherited = self.current() & FrameFlags::STEP_INTO;
            self.frames.push(inherited);
        }
    }

    /// Whether the current frame's step bits ask for a halt.
    pub fn stepping(&self) -> bool {
        self.current().intersects(FrameFlags::STEPPING)
    }

    /// Drop every step bit on the whole stack.
    pub fn clear_steps(&mut self) {
        for frame in &mut self.frames {
            frame.remove(FrameFlags::STEPPING);
        }
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        match mode {
            StepMode::StepInto => *self.current_mut() = FrameFlags::STEP_INTO,
            StepMode::StepOver => *self.current_mut() = FrameFlags::STEP_OVER,
            StepMode::ContinueToBreakpoint | StepMode::Run => self.clear_steps(),
        }
    }

    /// Run the current frame to completion and halt in its caller.
    pub fn return_from_frame(&mut self) {
        self.current_mut().remove(FrameFlags::STEPPING);
        let len = self.frames.len();
        if len >= 2 {
            self.frames[len - 2].insert(FrameFlags::STEP_INTO);
        }
    }
}

//! The JTAG TAP controller state machine.  `JtagState::next` follows a single TCK edge, and
//! `JtagState::path` finds the shortest sequence of TMS values between two states.  Both the
//! host-side `Jtag` driver and the simulated target use this to agree on where the TAP is.
use alloc::vec;
use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

#[cfg(test)]
const STATES: [JtagState; 16] = [
    Reset, Idle, SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR, SelectIR,
    CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
];

// Successor for TMS=0 and TMS=1, indexed by state
const EDGES: [[JtagState; 2]; 16] = [
    [Idle, Reset],
    [Idle, SelectDR],
    [CaptureDR, SelectIR],
    [ShiftDR, Exit1DR],
    [ShiftDR, Exit1DR],
    [PauseDR, UpdateDR],
    [PauseDR, Exit2DR],
    [ShiftDR, UpdateDR],
    [Idle, SelectDR],
    [CaptureIR, Reset],
    [ShiftIR, Exit1IR],
    [ShiftIR, Exit1IR],
    [PauseIR, UpdateIR],
    [PauseIR, Exit2IR],
    [ShiftIR, UpdateIR],
    [Idle, SelectIR],
];

#[derive(Clone)]
struct Path {
    path: Vec<bool>,
    state: JtagState,
}

impl JtagState {
    /// The state reached after one rising TCK edge with the given TMS level
    pub fn next(self, tms: bool) -> JtagState {
        EDGES[self as usize][tms as usize]
    }

    /// TMS values that move the TAP from `self` to `target` by the most efficient path.  Empty
    /// when already there.
    pub fn path(self, target: JtagState) -> Vec<bool> {
        if self == target {
            return Vec::new();
        }

        let mut paths = vec![Path {
            path: Vec::new(),
            state: self,
        }];

        // Every state is reachable within 8 edges
        loop {
            let mut newpaths = Vec::new();

            for p in paths {
                for tms in [false, true] {
                    let mut p1 = p.clone();
                    p1.state = p.state.next(tms);
                    p1.path.push(tms);

                    if p1.state == target {
                        return p1.path;
                    }
                    newpaths.push(p1);
                }
            }

            paths = newpaths;
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ShiftDR | ShiftIR)
    }
}

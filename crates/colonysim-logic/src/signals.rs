//! Small signal grid: buttons, wires, NOR gates and lights.
//!
//! Orthogonally connected wires form a net. A net is powered when a pressed
//! button touches it or a gate whose output is high faces into it. A gate's
//! front cell is its output; its back and two side cells are inputs. Gate
//! outputs are double-buffered: every gate reads last tick's outputs and
//! the new values are swapped in together.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Ticks a button stays pressed after `press`.
pub const BUTTON_PULSE_TICKS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    North,
    East,
    South,
    West,
}

impl Facing {
    fn delta(self) -> (i32, i32) {
        match self {
            Facing::North => (0, -1),
            Facing::East => (1, 0),
            Facing::South => (0, 1),
            Facing::West => (-1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalCell {
    #[default]
    Empty,
    Wire,
    Button,
    Nor(Facing),
    Light,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalGrid {
    width: i32,
    height: i32,
    cells: Vec<SignalCell>,
    /// Remaining pressed ticks per button cell.
    pulse: Vec<u8>,
    /// Gate outputs read this tick.
    sig_read: Vec<bool>,
    /// Gate outputs written this tick.
    sig_write: Vec<bool>,
    /// Net id per wire cell, recomputed on edit.
    net_of: Vec<Option<usize>>,
    net_count: usize,
    powered: Vec<bool>,
    lights: Vec<bool>,
    ticks: u64,
}

const ORTHO: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

impl SignalGrid {
    pub fn new(width: i32, height: i32) -> Self {
        let n = (width * height).max(0) as usize;
        Self {
            width,
            height,
            cells: vec![SignalCell::Empty; n],
            pulse: vec![0; n],
            sig_read: vec![false; n],
            sig_write: vec![false; n],
            net_of: vec![None; n],
            net_count: 0,
            powered: Vec::new(),
            lights: vec![false; n],
            ticks: 0,
        }
    }

    fn idx(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            None
        } else {
            Some((y * self.width + x) as usize)
        }
    }

    pub fn cell(&self, x: i32, y: i32) -> SignalCell {
        self.idx(x, y).map(|i| self.cells[i]).unwrap_or_default()
    }

    pub fn place(&mut self, x: i32, y: i32, cell: SignalCell) {
        let Some(i) = self.idx(x, y) else {
            debug_assert!(false, "signal cell ({}, {}) out of bounds", x, y);
            return;
        };
        self.cells[i] = cell;
        self.pulse[i] = 0;
        self.sig_read[i] = false;
        self.sig_write[i] = false;
        self.rebuild_nets();
    }

    /// Set a gate's current output, used to give a latch its resting state.
    pub fn set_gate_output(&mut self, x: i32, y: i32, on: bool) {
        if let Some(i) = self.idx(x, y) {
            if matches!(self.cells[i], SignalCell::Nor(_)) {
                self.sig_read[i] = on;
            }
        }
    }

    pub fn gate_output(&self, x: i32, y: i32) -> bool {
        self.idx(x, y).map(|i| self.sig_read[i]).unwrap_or(false)
    }

    pub fn press(&mut self, x: i32, y: i32) {
        if let Some(i) = self.idx(x, y) {
            if self.cells[i] == SignalCell::Button {
                self.pulse[i] = BUTTON_PULSE_TICKS;
            }
        }
    }

    pub fn light_on(&self, x: i32, y: i32) -> bool {
        self.idx(x, y).map(|i| self.lights[i]).unwrap_or(false)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn rebuild_nets(&mut self) {
        self.net_of.iter_mut().for_each(|n| *n = None);
        self.net_count = 0;
        let mut queue = VecDeque::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let i = (y * self.width + x) as usize;
                if self.cells[i] != SignalCell::Wire || self.net_of[i].is_some() {
                    continue;
                }
                let net = self.net_count;
                self.net_count += 1;
                self.net_of[i] = Some(net);
                queue.push_back((x, y));
                while let Some((cx, cy)) = queue.pop_front() {
                    for (dx, dy) in ORTHO {
                        if let Some(j) = self.idx(cx + dx, cy + dy) {
                            if self.cells[j] == SignalCell::Wire && self.net_of[j].is_none() {
                                self.net_of[j] = Some(net);
                                queue.push_back((cx + dx, cy + dy));
                            }
                        }
                    }
                }
            }
        }
        self.powered = vec![false; self.net_count];
    }

    fn compute_power(&mut self) {
        self.powered.iter_mut().for_each(|p| *p = false);
        for y in 0..self.height {
            for x in 0..self.width {
                let i = (y * self.width + x) as usize;
                match self.cells[i] {
                    SignalCell::Button if self.pulse[i] > 0 => {
                        for (dx, dy) in ORTHO {
                            if let Some(net) = self.idx(x + dx, y + dy).and_then(|j| self.net_of[j]) {
                                self.powered[net] = true;
                            }
                        }
                    }
                    SignalCell::Nor(facing) if self.sig_read[i] => {
                        let (dx, dy) = facing.delta();
                        if let Some(net) = self.idx(x + dx, y + dy).and_then(|j| self.net_of[j]) {
                            self.powered[net] = true;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn input_high(&self, x: i32, y: i32) -> bool {
        let Some(i) = self.idx(x, y) else {
            return false;
        };
        match self.cells[i] {
            SignalCell::Wire => self.net_of[i].map(|n| self.powered[n]).unwrap_or(false),
            SignalCell::Button => self.pulse[i] > 0,
            _ => false,
        }
    }

    fn compute_lights(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                let i = (y * self.width + x) as usize;
                if self.cells[i] != SignalCell::Light {
                    continue;
                }
                self.lights[i] = ORTHO.iter().any(|&(dx, dy)| self.input_high(x + dx, y + dy));
            }
        }
    }

    /// Advance one tick.
    pub fn tick(&mut self) {
        self.compute_power();

        for y in 0..self.height {
            for x in 0..self.width {
                let i = (y * self.width + x) as usize;
                if let SignalCell::Nor(facing) = self.cells[i] {
                    let (fx, fy) = facing.delta();
                    // back, then the two sides
                    let inputs = [(x - fx, y - fy), (x + fy, y - fx), (x - fy, y + fx)];
                    let any = inputs.iter().any(|&(ix, iy)| self.input_high(ix, iy));
                    self.sig_write[i] = !any;
                }
            }
        }
        std::mem::swap(&mut self.sig_read, &mut self.sig_write);
        for (i, cell) in self.cells.iter().enumerate() {
            if !matches!(cell, SignalCell::Nor(_)) {
                self.sig_read[i] = false;
            }
        }

        self.compute_power();
        self.compute_lights();

        for p in self.pulse.iter_mut() {
            *p = p.saturating_sub(1);
        }
        self.ticks += 1;
    }
}

/// Coordinates of the NOR latch layout built by [`nor_latch`].
pub mod latch {
    pub const SET_BUTTON: (i32, i32) = (0, 0);
    pub const RESET_BUTTON: (i32, i32) = (0, 7);
    pub const LIGHT: (i32, i32) = (5, 5);
    pub const GATE_QB: (i32, i32) = (3, 2);
    pub const GATE_Q: (i32, i32) = (3, 5);
}

/// Build a set/reset NOR latch on a 16x8 grid, resting in the reset state.
pub fn nor_latch() -> SignalGrid {
    let mut g = SignalGrid::new(16, 8);
    g.place(latch::SET_BUTTON.0, latch::SET_BUTTON.1, SignalCell::Button);
    for (x, y) in [(1, 0), (2, 0), (3, 0), (3, 1)] {
        g.place(x, y, SignalCell::Wire);
    }
    g.place(latch::GATE_QB.0, latch::GATE_QB.1, SignalCell::Nor(Facing::West));
    for (x, y) in [(2, 2), (2, 3), (2, 4), (2, 5)] {
        g.place(x, y, SignalCell::Wire);
    }
    g.place(latch::GATE_Q.0, latch::GATE_Q.1, SignalCell::Nor(Facing::East));
    for (x, y) in [(4, 5), (4, 4), (4, 3), (4, 2)] {
        g.place(x, y, SignalCell::Wire);
    }
    g.place(latch::RESET_BUTTON.0, latch::RESET_BUTTON.1, SignalCell::Button);
    for (x, y) in [(1, 7), (2, 7), (3, 7), (3, 6)] {
        g.place(x, y, SignalCell::Wire);
    }
    g.place(latch::LIGHT.0, latch::LIGHT.1, SignalCell::Light);

    g.set_gate_output(latch::GATE_QB.0, latch::GATE_QB.1, true);
    g.set_gate_output(latch::GATE_Q.0, latch::GATE_Q.1, false);
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(g: &mut SignalGrid, ticks: usize) {
        for _ in 0..ticks {
            g.tick();
        }
    }

    #[test]
    fn test_latch_rests_off() {
        let mut g = nor_latch();
        run(&mut g, 5);
        assert!(!g.light_on(latch::LIGHT.0, latch::LIGHT.1));
    }

    #[test]
    fn test_latch_set_and_reset() {
        let mut g = nor_latch();
        run(&mut g, 2);

        g.press(latch::SET_BUTTON.0, latch::SET_BUTTON.1);
        run(&mut g, 3);
        assert!(g.light_on(latch::LIGHT.0, latch::LIGHT.1), "set pulse should latch on");

        run(&mut g, 10);
        assert!(g.light_on(latch::LIGHT.0, latch::LIGHT.1), "latch holds without input");

        g.press(latch::SET_BUTTON.0, latch::SET_BUTTON.1);
        run(&mut g, 3);
        assert!(g.light_on(latch::LIGHT.0, latch::LIGHT.1), "second set is idempotent");

        g.press(latch::RESET_BUTTON.0, latch::RESET_BUTTON.1);
        run(&mut g, 3);
        assert!(!g.light_on(latch::LIGHT.0, latch::LIGHT.1), "reset clears the latch");
    }

    #[test]
    fn test_nor_with_no_inputs_is_high() {
        let mut g = SignalGrid::new(4, 1);
        g.place(1, 0, SignalCell::Nor(Facing::East));
        g.place(2, 0, SignalCell::Wire);
        g.place(3, 0, SignalCell::Light);
        g.tick();
        assert!(g.gate_output(1, 0));
        assert!(g.light_on(3, 0));
    }
}

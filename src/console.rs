//! Line-oriented output used by host imports and the demo drivers.

use std::cell::RefCell;
use std::rc::Rc;

pub trait Console {
    fn log(&self, line: &str);
}

/// Prints each line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn log(&self, line: &str) {
        println!("{line}");
    }
}

/// Records lines in memory. Clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    lines: Rc<RefCell<Vec<String>>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Console for BufferConsole {
    fn log(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}

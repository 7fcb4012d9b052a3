//! Terminal alert sink: rings the bell on stderr while an alarm is alerting.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;

use geoalarm_core::AlertSink;

#[derive(Debug)]
pub struct TerminalAlert {
    color: bool,
    active: AtomicBool,
}

impl TerminalAlert {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            active: AtomicBool::new(false),
        }
    }

    fn announce(&self, message: &str) {
        let mut stderr = io::stderr().lock();
        let _ = if self.color {
            writeln!(stderr, "{}", message.bold().red())
        } else {
            writeln!(stderr, "{message}")
        };
    }
}

impl AlertSink for TerminalAlert {
    fn start_continuous_alert(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            self.announce("\x07Alarm ringing: go to its location and run `geoalarm stop`");
        }
    }

    fn stop_alert(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.announce("Alarm silenced");
        }
    }
}

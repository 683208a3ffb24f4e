//! Terminal output for the watch command.

use chrono::Local;
use colored::*;
use detlink::detection::{Detection, Placement, Renderer};

/// Prints each placed detection as a line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    pub printed: u64,
}

impl Renderer for ConsoleRenderer {
    type Handle = ();

    fn spawn(&mut self, detection: &Detection, placement: &Placement) {
        self.printed += 1;
        println!(
            "{} {:<14} bbox={:?} -> x={:.1} y={:.1} w={:.1} h={:.1}",
            Local::now().format("%H:%M:%S%.3f").to_string().dimmed(),
            detection.class_name.green(),
            detection.bbox,
            placement.x,
            placement.anchor_y,
            placement.width,
            placement.height
        );
    }

    fn retire(&mut self, _handle: ()) {}
}

/// Status line printer for the connection indicator.
pub fn print_status(connected: bool) {
    if connected {
        println!("{}", "● connected".green());
    } else {
        println!("{}", "● disconnected".red());
    }
}

//! Per-phase stdout line parsers
//!
//! The process runner feeds every complete stdout line to one of these.
//! Parsers mutate the shared [`ProgressTracker`] as a side effect and
//! ignore anything they do not recognize; they must never block or panic
//! on arbitrary tool output.

use crate::progress::ProgressTracker;

/// Consumes one complete stdout line from an external tool.
pub trait LineParser {
    fn on_line(&mut self, line: &str);
}

/// Ignores everything. Used for tools with no parseable progress output
/// (Flatpak's interactive-style output carries no stable counters).
#[derive(Debug, Default)]
pub struct SilentParser;

impl LineParser for SilentParser {
    fn on_line(&mut self, _line: &str) {}
}

/// Parses `[<done>/<total>] ...` counters from package-manager output.
///
/// The package manager emits one counter scale while downloading and a
/// second, differently-sized scale while installing. A change of `<total>`
/// mid-stream therefore marks a sub-phase boundary: the parser re-anchors
/// at the units already completed and advances the phase
/// (Idle -> Downloading -> Installing). Subsequent `<done>` values are
/// credited on top of the anchor.
pub struct PackageProgressParser {
    tracker: ProgressTracker,
    seen_total: u64,
    anchor: u64,
}

impl PackageProgressParser {
    pub fn new(tracker: ProgressTracker) -> Self {
        Self { tracker, seen_total: 0, anchor: 0 }
    }
}

impl LineParser for PackageProgressParser {
    fn on_line(&mut self, line: &str) {
        if !line.starts_with('[') {
            return;
        }
        let Some(close) = line.find(']') else { return };
        let Some(slash) = line.find('/') else { return };
        // The '/' must sit inside the brackets
        if slash >= close {
            return;
        }
        let Ok(total) = line[slash + 1..close].trim().parse::<u64>() else { return };
        let Ok(done) = line[1..slash].trim().parse::<u64>() else { return };

        if self.seen_total != total {
            // Sub-phase boundary: anchor at what is already done
            self.anchor = self.tracker.completed();
            self.tracker.advance_package_phase();
            self.seen_total = total;
        }
        self.tracker.set_completed(self.anchor + done);
    }
}

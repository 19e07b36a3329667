use regex::Regex;
use std::{sync::OnceLock, time::Duration};

/// Cosmetic ticker steps used by `ProgressMode::Simulated`, one per `SIMULATED_TICK`.
pub const SIMULATED_STEPS: [u8; 10] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 95];
pub const SIMULATED_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub animation: Option<u32>,
    pub percent: u8,
}

fn bar_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // e.g. "Animation 3: Create(Circle):  45%|████▌     | 27/60 [00:00<00:00, 90.12it/s]"
    RE.get_or_init(|| {
        Regex::new(r"(?:Animation\s+(\d+)\b[^|]*?)?(\d{1,3})%\|")
            .expect("progress bar pattern is valid")
    })
}

/// Pull a progress value out of one redraw of a tqdm style bar.
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let caps = bar_regex().captures(line)?;
    let percent = caps.get(2)?.as_str().parse::<u8>().ok()?.min(100);
    let animation = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
    Some(ProgressUpdate { animation, percent })
}

/// Incremental reader for the renderer's stderr.
///
/// Progress bars are redrawn in place with `\r`, so segments are split on both `\r` and `\n`.
/// The full text is kept for diagnostics once the process exits.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: Vec<u8>,
    captured: Vec<u8>,
    last: Option<ProgressUpdate>,
}

impl ProgressParser {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ProgressUpdate> {
        self.captured.extend_from_slice(bytes);
        let mut updates = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                let segment = std::mem::take(&mut self.pending);
                self.consume(&segment, &mut updates);
            } else {
                self.pending.push(b);
            }
        }
        updates
    }

    /// Flush the unterminated tail and return everything read.
    pub fn finish(mut self) -> (String, Vec<ProgressUpdate>) {
        let mut updates = Vec::new();
        let segment = std::mem::take(&mut self.pending);
        self.consume(&segment, &mut updates);
        (String::from_utf8_lossy(&self.captured).to_string(), updates)
    }

    fn consume(&mut self, segment: &[u8], updates: &mut Vec<ProgressUpdate>) {
        if segment.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(segment);
        if let Some(update) = parse_progress_line(&line) {
            // redraws often repeat the same value
            if self.last != Some(update) {
                self.last = Some(update);
                updates.push(update);
            }
        }
    }
}

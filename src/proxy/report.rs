//! Plain-text presentation of probe outcomes

use crate::proxy::checker::BatchSummary;
use crate::proxy::models::{ProbeOutcome, ProbeStatus};
use crate::proxy::probe::excerpt;

/// Multi-line description of one outcome, errors cut to `excerpt_len` characters
pub fn render_outcome(index: usize, total: usize, outcome: &ProbeOutcome, excerpt_len: usize) -> String {
    let header = format!("[{}/{}] {}", index + 1, total, outcome.endpoint);
    let time = format!("{:.3}s", outcome.elapsed.as_secs_f64());
    match &outcome.status {
        ProbeStatus::Alive {
            status_code,
            body_excerpt,
        } => format!(
            "{}\n  alive: true\n  code: {}\n  time: {}\n  content: {}",
            header,
            status_code,
            time,
            excerpt(body_excerpt, excerpt_len).replace(['\r', '\n'], " ")
        ),
        ProbeStatus::Dead { kind, error } => format!(
            "{}\n  alive: false ({})\n  time: {}\n  error: {}",
            header,
            kind,
            time,
            excerpt(error, excerpt_len)
        ),
    }
}

/// One-line batch summary
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut line = format!(
        "Checked {}/{} proxies, {} alive",
        summary.checked, summary.total, summary.alive
    );
    if summary.cancelled {
        line.push_str(" (cancelled)");
    }
    line
}

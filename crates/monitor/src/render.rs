//! One-line terminal rendering of the light and the elapsed-time label.

use traffic_light_core::elapsed::format_elapsed;
use traffic_light_core::model::BuildStatus;

use crate::poller::ViewState;

/// Light colour for the current status; dashes until the first result.
pub fn light(view: &ViewState) -> &'static str {
    match view.check_state_result.as_ref().map(|r| r.status) {
        Some(BuildStatus::Success) => "GREEN",
        Some(BuildStatus::Fail) => "RED",
        None => "----",
    }
}

/// Time since the last transition (or since mount) as `HH:MM:SS`.
pub fn timer_label(view: &ViewState) -> String {
    format_elapsed(view.elapsed_since_ms(), view.now_ms)
}

pub fn render(view: &ViewState) -> String {
    let mut line = format!("[{}] {}", light(view), timer_label(view));

    if let Some(result) = &view.check_state_result {
        let items: Vec<String> = result
            .items
            .iter()
            .map(|item| {
                let mut s = item.display_name.clone();
                if !item.investigators.is_empty() {
                    s.push_str(&format!(" ({})", item.investigators.join(", ")));
                }
                if item.running {
                    s.push_str(" [running]");
                }
                s
            })
            .collect();
        if !items.is_empty() {
            line.push_str("  ");
            line.push_str(&items.join(" | "));
        }
    }

    if let Some(err) = &view.last_error {
        line.push_str(&format!("  (stale: {err})"));
    }
    line
}

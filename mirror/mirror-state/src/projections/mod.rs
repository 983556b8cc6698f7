//! Read-only views derived from the caches.

pub mod decorations;
pub mod status_bar;

pub use decorations::{FileDecoration, FileDecorations};
pub use status_bar::{StatusBar, StatusBarView};

use chrono::TimeDelta;
use chrono_humanize::{Accuracy, HumanTime, Tense};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A length of time, e.g. "2 minutes".
pub fn humanize_duration(millis: i64) -> String {
    HumanTime::from(TimeDelta::milliseconds(millis)).to_text_en(Accuracy::Rough, Tense::Present)
}

/// Time elapsed since `timestamp`, e.g. "3 hours ago".
pub fn humanize_age(timestamp: i64, now: i64) -> String {
    HumanTime::from(TimeDelta::milliseconds((now - timestamp).max(0)))
        .to_text_en(Accuracy::Rough, Tense::Past)
}

use std::sync::LazyLock;

use regex::Regex;

/// Matches detector summaries such as "2 Unauthorizeds".
static UNAUTHORIZED_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+Unauthorized").expect("Invalid count pattern"));

static UNAUTHORIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUnauthorized\b").expect("Invalid word pattern"));

/// Per-frame detector summary: "0: 480x640 ..." for streams, or
/// "video 1/1 (frame 3/90) clip.mp4: 480x640 ..." for files.
static FRAME_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+|.*\(frame \d+/\d+\).*):\s+\d+x\d+\s").expect("Invalid frame pattern")
});

/// Number of unauthorized objects reported on one detector output line.
/// A count in front of the class name is used when present, otherwise a
/// bare mention counts as one.
pub fn count_unauthorized(line: &str) -> u32 {
    if let Some(count) = UNAUTHORIZED_COUNT
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return count;
    }

    if UNAUTHORIZED_WORD.is_match(line) {
        1
    } else {
        0
    }
}

/// Unauthorized count for a line that describes one observed frame, or
/// `None` for anything else the detector prints (timings, warnings,
/// tracebacks). Only observations may tick the debouncer.
///
/// A line outside the frame format that still names the class counts as
/// a positive observation, so simple detectors printing bare
/// "Unauthorized" lines keep working.
pub fn frame_observation(line: &str) -> Option<u32> {
    if FRAME_SUMMARY.is_match(line) {
        return Some(count_unauthorized(line));
    }

    match count_unauthorized(line) {
        0 => None,
        count => Some(count),
    }
}

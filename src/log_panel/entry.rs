//! A single rendered buffer line, plus the line-wrapping and header-label
//! algorithms, grounded directly in the original `logPanel.splitLine` and
//! the draw-time header-compaction logic.

use crate::runlevel::parse_runlevel_ranges;

/// Colour categories the original source picks per event type. Actual
/// terminal colour selection is out of scope for this crate; this is the
/// semantic hint a rendering layer would map onto its own palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourHint {
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
    Magenta,
    White,
}

/// One fully-rendered buffer entry: text, a colour hint, and an insertion
/// order. `seq` is a monotonically increasing counter (newest entries get
/// the highest value) so callers can recover strict insertion order even
/// after the buffer has been filtered or reordered by a caller for
/// display.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub text: String,
    pub colour: ColourHint,
    pub seq: u64,
}

/// Divides an overflowing line into two display lines, preferring a
/// word-break within the first `width` characters; falls back to
/// hyphenation when the nearest word-break is too far back, and ellipsizes
/// the continuation if it's still too long.
pub fn split_line(message: &str, width: usize) -> (String, String) {
    let chars: Vec<char> = message.chars().collect();
    let head_len = width.min(chars.len());
    let head = &chars[..head_len];
    let last_wordbreak = head.iter().rposition(|&c| c == ' ');

    let (line1, mut line2) = match last_wordbreak {
        Some(lw) if width - lw < 10 => {
            let line1: String = chars[..lw].iter().collect();
            let rest: String = chars[lw..].iter().collect();
            (line1, format!("  {}", rest.trim()))
        }
        _ => {
            let cut = head_len.saturating_sub(2);
            let line1: String = chars[..cut].iter().collect::<String>() + "-";
            let rest: String = chars[cut..].iter().collect();
            (line1, format!("  {}", rest.trim()))
        }
    };

    if line2.chars().count() > width {
        let line2_chars: Vec<char> = line2.chars().collect();
        let cut2 = width.saturating_sub(4).min(line2_chars.len());
        let mut wordbreak2 = line2_chars[..cut2].iter().rposition(|&c| c == ' ');
        if let Some(lw2) = wordbreak2 {
            if width - lw2 > 10 || lw2 == 1 {
                wordbreak2 = None;
            }
        }
        let cut_final = wordbreak2.unwrap_or_else(|| width.saturating_sub(4)).min(line2_chars.len());
        let truncated: String = line2_chars[..cut_final].iter().collect();
        line2 = format!("{truncated}...");
    }

    (line1, line2)
}

/// Builds the "Events (...)" header label: the subscribed event set with
/// runlevel runs compacted into ranges, router and internal (`ARM_`)
/// severities shown separately, truncated with an ellipsis at the last
/// comma that fits.
pub fn header_label(subscribed_events: &[String], filter_pattern: Option<&str>, width: usize) -> String {
    let mut events_list: Vec<String> = subscribed_events.to_vec();
    let tor_runlevels = parse_runlevel_ranges(&mut events_list, "").join(", ");
    let arm_runlevels = parse_runlevel_ranges(&mut events_list, "ARM_").join(", ");

    if !arm_runlevels.is_empty() {
        events_list.insert(0, format!("ARM {arm_runlevels}"));
    }
    if !tor_runlevels.is_empty() {
        events_list.insert(0, tor_runlevels);
    }

    let events_listing = events_list.join(", ");
    let filter_label = filter_pattern.map(|p| format!(" - filter: {p}")).unwrap_or_default();

    let first_label_len = match events_listing.find(", ") {
        Some(pos) => pos + 3,
        None => events_listing.chars().count(),
    };

    let mut label = String::from("Events");
    if width > 10 + first_label_len {
        label.push_str(" (");
        if events_listing.chars().count() > width.saturating_sub(11) {
            let cut = width.saturating_sub(12);
            let chars: Vec<char> = events_listing.chars().collect();
            let head: String = chars[..cut.min(chars.len())].iter().collect();
            let break_at = head.rfind(", ").unwrap_or(head.len());
            label.push_str(&head[..break_at]);
            label.push_str("...");
        } else if events_listing.chars().count() + filter_label.chars().count() > width.saturating_sub(11) {
            label.push_str(&events_listing);
        } else {
            label.push_str(&events_listing);
            label.push_str(&filter_label);
        }
        label.push(')');
    }
    label.push(':');
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_prefers_word_break() {
        let (l1, l2) = split_line("a very long message that must be wrapped cleanly", 20);
        assert_eq!(l1, "a very long message");
        assert!(l2.starts_with("  "));
        assert!(!l2.contains('-'));
    }

    #[test]
    fn split_line_hyphenates_when_break_too_far() {
        let (l1, _) = split_line("supercalifragilisticexpialidocious is one word", 20);
        assert!(l1.ends_with('-'));
    }

    #[test]
    fn split_line_ellipsizes_overlong_continuation() {
        let long_msg = "word ".repeat(20);
        let (_, l2) = split_line(long_msg.trim(), 10);
        assert!(l2.ends_with("..."));
        assert!(l2.chars().count() <= 13);
    }

    #[test]
    fn header_label_compacts_runlevels() {
        let events = vec!["BW".to_string(), "NOTICE".to_string(), "WARN".to_string(), "ERR".to_string()];
        let label = header_label(&events, None, 200);
        assert!(label.contains("NOTICE - ERR"));
        assert!(label.starts_with("Events ("));
    }
}

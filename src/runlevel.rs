//! Bidirectional mapping between compact event-flag strings and fully
//! expanded event-name sets, grounded directly in the original
//! `expandEvents`/`parseRunlevelRanges` pair.

use std::collections::BTreeSet;

use crate::error::InvalidFlags;
use crate::events::Runlevel;

/// Single-letter flag to the event names it expands to unconditionally
/// (flags with runlevel-ladder semantics are handled separately).
fn single_letter_event(flag: char) -> Option<&'static str> {
    match flag {
        'd' => Some("DEBUG"),
        'i' => Some("INFO"),
        'n' => Some("NOTICE"),
        'w' => Some("WARN"),
        'e' => Some("ERR"),
        'a' => Some("ADDRMAP"),
        'l' => Some("NEWDESC"),
        'v' => Some("AUTHDIR_NEWDESCS"),
        'b' => Some("BW"),
        'm' => Some("NS"),
        'x' => Some("STATUS_GENERAL"),
        'c' => Some("CIRC"),
        'o' => Some("ORCONN"),
        'y' => Some("STATUS_CLIENT"),
        'f' => Some("DESCCHANGED"),
        's' => Some("STREAM"),
        'z' => Some("STATUS_SERVER"),
        'g' => Some("GUARD"),
        't' => Some("STREAM_BW"),
        'k' => Some("NEWCONSENSUS"),
        'u' => Some("CLIENTS_SEEN"),
        _ => None,
    }
}

/// All router event names known to this crate, used to expand `A`.
fn all_known_router_events() -> BTreeSet<String> {
    let mut events: BTreeSet<String> = [
        "DEBUG", "INFO", "NOTICE", "WARN", "ERR", "ADDRMAP", "NEWDESC", "AUTHDIR_NEWDESCS", "BW",
        "NS", "STATUS_GENERAL", "CIRC", "ORCONN", "STATUS_CLIENT", "DESCCHANGED", "STREAM",
        "STATUS_SERVER", "GUARD", "STREAM_BW", "NEWCONSENSUS", "CLIENTS_SEEN",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    events.insert("TORCTL".to_string());
    events.insert("UNKNOWN".to_string());
    events
}

/// Expands the ladder-style runlevel flags (`D`/`I`/`N`/`W`/`E` for the
/// router, `1`-`5` for this crate's internal diagnostics) into "this level
/// and stricter".
fn ladder_from(level: Runlevel, internal: bool) -> impl Iterator<Item = String> {
    Runlevel::ALL
        .into_iter()
        .filter(move |l| *l >= level)
        .map(move |l| if internal { l.arm_event_name() } else { l.as_str().to_string() })
}

/// Expands a compact event-flag string into the set of fully-qualified event
/// names it names. `A` and `X` terminate the scan: characters after them
/// are never inspected, recognized or not (see DESIGN.md for the resolved
/// open question this settles).
pub fn expand_events(flags: &str) -> Result<BTreeSet<String>, InvalidFlags> {
    let mut expanded = BTreeSet::new();
    let mut bad_chars = String::new();

    for flag in flags.chars() {
        match flag {
            'A' => {
                expanded = all_known_router_events();
                for level in Runlevel::ALL {
                    expanded.insert(level.arm_event_name());
                }
                break;
            }
            'X' => {
                expanded.clear();
                break;
            }
            'C' => {
                expanded.insert("TORCTL".to_string());
            }
            'U' => {
                expanded.insert("UNKNOWN".to_string());
            }
            'D' => expanded.extend(ladder_from(Runlevel::Debug, false)),
            'I' => expanded.extend(ladder_from(Runlevel::Info, false)),
            'N' => expanded.extend(ladder_from(Runlevel::Notice, false)),
            'W' => expanded.extend(ladder_from(Runlevel::Warn, false)),
            'E' => expanded.extend(ladder_from(Runlevel::Err, false)),
            '1' => expanded.extend(ladder_from(Runlevel::Debug, true)),
            '2' => expanded.extend(ladder_from(Runlevel::Info, true)),
            '3' => expanded.extend(ladder_from(Runlevel::Notice, true)),
            '4' => expanded.extend(ladder_from(Runlevel::Warn, true)),
            '5' => expanded.extend(ladder_from(Runlevel::Err, true)),
            other => {
                if let Some(name) = single_letter_event(other) {
                    expanded.insert(name.to_string());
                } else {
                    bad_chars.push(other);
                }
            }
        }
    }

    if bad_chars.is_empty() {
        Ok(expanded)
    } else {
        Err(InvalidFlags { bad_chars })
    }
}

/// Consumes `DEBUG..ERR` (with `prefix` applied) out of `events`, producing
/// an ordered list of range labels for contiguous runs. Mutates `events` by
/// removing whatever it consumed, mirroring the original `parseRunlevelRanges`.
pub fn parse_runlevel_ranges(events: &mut Vec<String>, prefix: &str) -> Vec<String> {
    const LADDER: [&str; 5] = ["DEBUG", "INFO", "NOTICE", "WARN", "ERR"];

    let mut labels = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let mut flush = |run: &mut Vec<&str>, labels: &mut Vec<String>| match run.len() {
        0 => {}
        1 => labels.push(run[0].to_string()),
        2 => {
            labels.push(run[0].to_string());
            labels.push(run[1].to_string());
        }
        _ => labels.push(format!("{} - {}", run[0], run[run.len() - 1])),
    };

    for level in LADDER {
        let key = format!("{prefix}{level}");
        if let Some(pos) = events.iter().position(|e| e == &key) {
            events.remove(pos);
            run.push(level);
        } else {
            flush(&mut run, &mut labels);
            run.clear();
        }
    }
    flush(&mut run, &mut labels);

    labels
}

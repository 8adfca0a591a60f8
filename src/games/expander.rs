//! Bet selector expansion
//!
//! Maps a compact bet selector to the deduplicated set of two-digit numbers it
//! covers. Pure and deterministic. A malformed selector expands to the empty set
//! and callers treat that as a validation failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Named ten-number sets offered as shortcuts
const PRESETS: &[(&str, [&str; 10])] = &[
    ("doubles", ["00", "11", "22", "33", "44", "55", "66", "77", "88", "99"]),
    ("power", ["05", "16", "27", "38", "49", "50", "61", "72", "83", "94"]),
    ("brothers", ["01", "12", "23", "34", "45", "56", "67", "78", "89", "90"]),
    ("nakhat", ["07", "18", "24", "35", "69", "70", "81", "42", "53", "96"]),
];

const PRESET_ALIASES: &[(&str, &str)] = &[
    ("double", "doubles"),
    ("bridge-pairs", "power"),
    ("bridge_pairs", "power"),
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgePosition {
    Head,
    Tail,
}

/// User bet intent before expansion. Parameters are kept as submitted so that
/// malformed input reaches [`expand`] and yields an empty set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Selector {
    Direct {
        number: String,
        #[serde(default)]
        include_reverse: bool,
    },
    Edge {
        position: EdgePosition,
        digit: String,
    },
    Preset {
        name: String,
    },
    /// "Break": every number touching an anchor digit, minus anchor doubles
    /// and pairs of two different anchors
    Break {
        anchors: String,
    },
}

impl Selector {
    /// Parse the compact textual forms: `42`, `42r`, `head=5`, `tail=5`,
    /// `preset=doubles`, `break=538`.
    pub fn parse(input: &str) -> Option<Selector> {
        let input = input.trim();
        if let Some((key, value)) = input.split_once('=') {
            let value = value.trim().to_string();
            return match key.trim().to_lowercase().as_str() {
                "head" => Some(Selector::Edge {
                    position: EdgePosition::Head,
                    digit: value,
                }),
                "tail" => Some(Selector::Edge {
                    position: EdgePosition::Tail,
                    digit: value,
                }),
                "preset" | "set" => Some(Selector::Preset { name: value }),
                "break" => Some(Selector::Break { anchors: value }),
                _ => None,
            };
        }

        match input.strip_suffix(&['r', 'R'][..]) {
            Some(number) => Some(Selector::Direct {
                number: number.to_string(),
                include_reverse: true,
            }),
            None => Some(Selector::Direct {
                number: input.to_string(),
                include_reverse: false,
            }),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Direct {
                number,
                include_reverse,
            } => write!(f, "{}{}", number, if *include_reverse { "R" } else { "" }),
            Selector::Edge { position, digit } => match position {
                EdgePosition::Head => write!(f, "head={}", digit),
                EdgePosition::Tail => write!(f, "tail={}", digit),
            },
            Selector::Preset { name } => write!(f, "preset={}", name),
            Selector::Break { anchors } => write!(f, "break={}", anchors),
        }
    }
}

pub fn is_two_digit(number: &str) -> bool {
    number.len() == 2 && number.bytes().all(|b| b.is_ascii_digit())
}

fn single_digit(value: &str) -> Option<u8> {
    match value.as_bytes() {
        [d] if d.is_ascii_digit() => Some(d - b'0'),
        _ => None,
    }
}

fn pair(head: u8, tail: u8) -> String {
    format!("{}{}", head, tail)
}

/// Expand a selector into the numbers it wagers on
pub fn expand(selector: &Selector) -> BTreeSet<String> {
    match selector {
        Selector::Direct {
            number,
            include_reverse,
        } => expand_direct(number, *include_reverse),
        Selector::Edge { position, digit } => expand_edge(*position, digit),
        Selector::Preset { name } => expand_preset(name),
        Selector::Break { anchors } => expand_break(anchors),
    }
}

fn expand_direct(number: &str, include_reverse: bool) -> BTreeSet<String> {
    let mut numbers = BTreeSet::new();
    if !is_two_digit(number) {
        return numbers;
    }
    numbers.insert(number.to_string());
    if include_reverse {
        numbers.insert(number.chars().rev().collect());
    }
    numbers
}

fn expand_edge(position: EdgePosition, digit: &str) -> BTreeSet<String> {
    let Some(d) = single_digit(digit) else {
        return BTreeSet::new();
    };
    (0..10)
        .map(|i| match position {
            EdgePosition::Head => pair(d, i),
            EdgePosition::Tail => pair(i, d),
        })
        .collect()
}

fn expand_preset(name: &str) -> BTreeSet<String> {
    let name = name.trim().to_lowercase();
    let canonical = PRESET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name.as_str());

    PRESETS
        .iter()
        .find(|(preset, _)| *preset == canonical)
        .map(|(_, numbers)| numbers.iter().map(|n| n.to_string()).collect())
        .unwrap_or_default()
}

fn expand_break(anchors: &str) -> BTreeSet<String> {
    if anchors.len() != 3 || !anchors.bytes().all(|b| b.is_ascii_digit()) {
        return BTreeSet::new();
    }
    let anchor_set: BTreeSet<u8> = anchors.bytes().map(|b| b - b'0').collect();
    let is_anchor = |d: u8| anchor_set.contains(&d);

    let mut numbers = BTreeSet::new();
    for head in 0..10u8 {
        for tail in 0..10u8 {
            let touches_anchor = is_anchor(head) || is_anchor(tail);
            let anchor_double = head == tail && is_anchor(head);
            let anchor_cross = head != tail && is_anchor(head) && is_anchor(tail);
            if touches_anchor && !anchor_double && !anchor_cross {
                numbers.insert(pair(head, tail));
            }
        }
    }
    numbers
}

/// Names accepted by [`Selector::Preset`]
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

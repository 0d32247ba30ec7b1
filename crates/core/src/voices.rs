//! Murf voice catalogue offered by the demo.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub label: &'static str,
    pub id: &'static str,
}

pub const DEFAULT_VOICE_ID: &str = "en-US-ken";

pub const MURF_VOICES: &[Voice] = &[
    Voice {
        label: "Ken (US Male)",
        id: "en-US-ken",
    },
    Voice {
        label: "Natalie (US Female)",
        id: "en-US-natalie",
    },
    Voice {
        label: "Clint (US Male)",
        id: "en-US-clint",
    },
    Voice {
        label: "Samantha (US Female)",
        id: "en-US-samantha",
    },
    Voice {
        label: "Terrell (US Male)",
        id: "en-US-terrell",
    },
    Voice {
        label: "Liv (UK Female)",
        id: "en-UK-liv",
    },
    Voice {
        label: "Daniel (UK Male)",
        id: "en-UK-daniel",
    },
];

/// Resolves a voice id or label, falling back to the closest fuzzy label match.
pub fn resolve_voice(query: &str) -> Option<&'static Voice> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    if let Some(voice) = MURF_VOICES
        .iter()
        .find(|v| v.id.eq_ignore_ascii_case(query) || v.label.eq_ignore_ascii_case(query))
    {
        return Some(voice);
    }

    let matcher = SkimMatcherV2::default();
    MURF_VOICES
        .iter()
        .filter_map(|v| matcher.fuzzy_match(v.label, query).map(|score| (score, v)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, v)| v)
}

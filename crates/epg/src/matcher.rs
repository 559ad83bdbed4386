//! Channel name matching.
//!
//! Maps channel display names known to the TV backend onto the provider's
//! channel list. Names are first compared after normalization; names without
//! an exact counterpart fall back to a similarity score and are only accepted
//! above a confidence threshold. Anything below the threshold is reported as
//! unmatched rather than guessed.
//!
//! Numbers in a name identify the channel within its family ("Ziggo Sport 2",
//! "NPO 1 Extra"), so two names whose numbers differ never match fuzzily.

use std::cmp::Reverse;

use epg_core::{Channel, ChannelId};
use tracing::debug;

/// Minimum similarity score for a non-exact match to be accepted.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Outcome of matching one requested name.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMatch {
    /// The name as requested by the caller.
    pub requested: String,
    /// The matched remote channel, if any candidate was good enough.
    pub channel: Option<Channel>,
    /// Similarity of the best candidate, `1.0` for an exact match.
    pub score: f64,
}

impl ChannelMatch {
    /// Returns true if a remote channel was found.
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        self.channel.is_some()
    }

    /// Returns the id of the matched channel.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel.as_ref().map(|c| &c.id)
    }
}

/// Resolves requested channel names against the remote channel list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelMatcher {
    threshold: f64,
}

impl Default for ChannelMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl ChannelMatcher {
    /// Creates a matcher accepting fuzzy matches scoring at least `threshold`.
    ///
    /// The threshold is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Returns the acceptance threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Matches every requested name, preserving the requested order.
    #[must_use]
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S], remote: &[Channel]) -> Vec<ChannelMatch> {
        let candidates: Vec<(NameKey, &Channel)> =
            remote.iter().map(|c| (NameKey::new(&c.name), c)).collect();

        requested
            .iter()
            .map(|name| self.resolve_one(name.as_ref(), &candidates))
            .collect()
    }

    fn resolve_one(&self, requested: &str, candidates: &[(NameKey, &Channel)]) -> ChannelMatch {
        let wanted = NameKey::new(requested);

        let best = candidates
            .iter()
            .map(|(name, channel)| (wanted.similarity(name), *channel))
            .max_by(|(sa, ca), (sb, cb)| {
                sa.total_cmp(sb)
                    .then_with(|| Reverse(&ca.id).cmp(&Reverse(&cb.id)))
            });

        match best {
            Some((score, channel)) if score >= self.threshold && score > 0.0 => {
                debug!(requested, channel = %channel.id, score, "Matched channel");
                ChannelMatch {
                    requested: requested.to_string(),
                    channel: Some(channel.clone()),
                    score,
                }
            }
            Some((score, _)) => ChannelMatch {
                requested: requested.to_string(),
                channel: None,
                score,
            },
            None => ChannelMatch {
                requested: requested.to_string(),
                channel: None,
                score: 0.0,
            },
        }
    }
}

/// Matches `requested` against `remote` with [`DEFAULT_MATCH_THRESHOLD`].
#[must_use]
pub fn resolve<S: AsRef<str>>(requested: &[S], remote: &[Channel]) -> Vec<ChannelMatch> {
    ChannelMatcher::default().resolve(requested, remote)
}

/// Normalizes a channel name for comparison.
///
/// Lower-cases, turns punctuation into spaces, collapses whitespace and drops
/// a trailing `hd` quality suffix.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    if tokens.len() > 1 && tokens.last() == Some(&"hd") {
        tokens.pop();
    }
    tokens.join(" ")
}

fn compact(normalized: &str) -> String {
    normalized.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The parts of a channel name that take part in matching.
#[derive(Debug)]
struct NameKey {
    /// Normalized name without spaces.
    compact: String,
    /// Digit runs of the normalized name, in order.
    numbers: Vec<String>,
}

impl NameKey {
    fn new(name: &str) -> Self {
        let normalized = normalize_name(name);
        let numbers = normalized
            .split(|c: char| !c.is_numeric())
            .filter(|run| !run.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            compact: compact(&normalized),
            numbers,
        }
    }

    fn similarity(&self, other: &Self) -> f64 {
        let (a, b) = (&self.compact, &other.compact);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        if self.numbers != other.numbers {
            return 0.0;
        }
        (0.5 * jaro_winkler(a, b) + 0.5 * levenshtein_similarity(a, b)).clamp(0.0, 1.0)
    }
}

/// Similarity of two channel names in `[0, 1]`.
///
/// Names equal after normalization score `1.0`. Names whose numbers differ
/// score `0.0`. Otherwise this is the average of Jaro-Winkler and normalized
/// Levenshtein similarity of the normalized names with spaces removed.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    NameKey::new(a).similarity(&NameKey::new(b))
}

fn jaro_winkler(s1: &str, s2: &str) -> f64 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && *ca == b[j] {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let a_seq = a.iter().zip(&a_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let b_seq = b.iter().zip(&b_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let transpositions = a_seq.zip(b_seq).filter(|(x, y)| x != y).count();

    let m = matches as f64;
    let jaro = (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64 / 2.0) / m)
        / 3.0;

    let prefix = a
        .iter()
        .zip(&b)
        .take(4)
        .take_while(|(x, y)| x == y)
        .count() as f64;

    jaro + 0.1 * prefix * (1.0 - jaro)
}

fn levenshtein_similarity(s1: &str, s2: &str) -> f64 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    1.0 - previous[b.len()] as f64 / max_len as f64
}

//! Matching of freshly produced findings against the findings known before
//! the run.
//!
//! Strategies are tried from most to least discriminant; the first one that
//! finds an unmatched previous finding wins and consumes it.

use scrutin_model::LiveFinding;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStrategy {
    LineAndRangeHash,
    RangeHashAndMessage,
    LineAndMessage,
    RangeHash,
    LineAndLineHash,
    LineHash,
    ServerKey,
}

impl MatchStrategy {
    pub const ORDER: [MatchStrategy; 7] = [
        MatchStrategy::LineAndRangeHash,
        MatchStrategy::RangeHashAndMessage,
        MatchStrategy::LineAndMessage,
        MatchStrategy::RangeHash,
        MatchStrategy::LineAndLineHash,
        MatchStrategy::LineHash,
        MatchStrategy::ServerKey,
    ];

    /// Search key of `finding` under this strategy. `None` means the finding
    /// cannot take part in this strategy at all.
    fn key<'a>(&self, finding: &'a LiveFinding) -> Option<MatchKey<'a>> {
        let rule = finding.rule_key.as_str();
        let line = finding.line();
        let range_hash = finding.range_hash.as_deref();
        let line_hash = finding.line_hash.as_deref();
        let message = finding.message.as_str();

        let key = match self {
            MatchStrategy::LineAndRangeHash => MatchKey {
                rule: Some(rule),
                line,
                range_hash,
                ..MatchKey::default()
            },
            MatchStrategy::RangeHashAndMessage => MatchKey {
                rule: Some(rule),
                message: Some(message),
                range_hash,
                ..MatchKey::default()
            },
            MatchStrategy::LineAndMessage => MatchKey {
                rule: Some(rule),
                line,
                message: Some(message),
                ..MatchKey::default()
            },
            MatchStrategy::RangeHash => MatchKey {
                rule: Some(rule),
                range_hash,
                ..MatchKey::default()
            },
            MatchStrategy::LineAndLineHash => MatchKey {
                rule: Some(rule),
                line,
                line_hash,
                ..MatchKey::default()
            },
            MatchStrategy::LineHash => MatchKey {
                rule: Some(rule),
                line_hash,
                ..MatchKey::default()
            },
            MatchStrategy::ServerKey => {
                let server_key = finding
                    .server_key
                    .as_deref()
                    .filter(|key| !key.trim().is_empty())?;
                MatchKey {
                    server_key: Some(server_key),
                    ..MatchKey::default()
                }
            }
        };
        Some(key)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct MatchKey<'a> {
    rule: Option<&'a str>,
    line: Option<u32>,
    message: Option<&'a str>,
    range_hash: Option<&'a str>,
    line_hash: Option<&'a str>,
    server_key: Option<&'a str>,
}

/// Previous findings of one file that have not been matched yet.
#[derive(Debug, Default)]
pub struct FileTracking {
    unmatched: Vec<LiveFinding>,
}

impl FileTracking {
    pub fn new(previous: impl IntoIterator<Item = LiveFinding>) -> Self {
        Self {
            unmatched: previous.into_iter().collect(),
        }
    }

    /// Finds and consumes the previous finding `candidate` continues, if any.
    pub fn take_match(
        &mut self,
        candidate: &LiveFinding,
    ) -> Option<(MatchStrategy, LiveFinding)> {
        for strategy in MatchStrategy::ORDER {
            let Some(wanted) = strategy.key(candidate) else {
                continue;
            };
            let position = self
                .unmatched
                .iter()
                .position(|base| strategy.key(base).as_ref() == Some(&wanted));
            if let Some(position) = position {
                return Some((strategy, self.unmatched.remove(position)));
            }
        }
        None
    }

    pub fn unmatched(&self) -> &[LiveFinding] {
        &self.unmatched
    }

    pub fn into_unmatched(self) -> Vec<LiveFinding> {
        self.unmatched
    }
}

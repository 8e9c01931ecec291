//! Fuzzy column-name resolution
//!
//! Maps raw input column names onto canonical member names with five ordered
//! passes. Each pass only considers raw names still unresolved and members
//! still unclaimed, and every match is one-to-one.
//!
//! 1. exact (case-sensitive)
//! 2. case-insensitive
//! 3. normalized forms (alnum-lowercase, snake_case, camelCase)
//! 4. resemblance score (prefix / suffix / substring / shared tokens)
//! 5. Levenshtein distance
//!
//! Ties inside a pass go to the shortest candidate, then the lexicographically
//! smallest. Competing raw names are served in input order.

use super::names::{levenshtein, NameForms};
use serde::{Deserialize, Serialize};

const PREFIX_WEIGHT: u32 = 2;
const SUFFIX_WEIGHT: u32 = 2;
const SUBSTRING_WEIGHT: u32 = 1;
const TOKEN_WEIGHT: u32 = 1;

/// Acceptance thresholds for the fuzzy passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolverOptions {
    /// Minimum resemblance score accepted by pass 4
    pub min_resemblance: u32,
    /// Maximum edit distance accepted by pass 5
    pub max_edit_distance: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            min_resemblance: 4,
            max_edit_distance: 2,
        }
    }
}

/// The pass that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Exact,
    CaseInsensitive,
    Normalized,
    Resemblance,
    EditDistance,
}

/// Outcome for one raw name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical member name, or the raw name when unresolved
    pub name: String,
    /// Index into the candidate list of the matched member
    pub candidate: Option<usize>,
    pub pass: Option<MatchPass>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.pass.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    options: ResolverOptions,
    case_sensitive: bool,
}

impl NameResolver {
    pub fn new(options: ResolverOptions) -> Self {
        NameResolver {
            options,
            case_sensitive: false,
        }
    }

    /// Restrict resolution to the exact pass
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Resolve raw names; unresolved entries come back unchanged
    pub fn resolve<R: AsRef<str>, C: AsRef<str>>(&self, raw: &[R], candidates: &[C]) -> Vec<String> {
        self.resolve_detailed(raw, candidates)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    pub fn resolve_detailed<R: AsRef<str>, C: AsRef<str>>(
        &self,
        raw: &[R],
        candidates: &[C],
    ) -> Vec<Resolution> {
        let raw: Vec<&str> = raw.iter().map(AsRef::as_ref).collect();
        let candidates: Vec<&str> = candidates.iter().map(AsRef::as_ref).collect();

        let mut state = PassState {
            candidates: &candidates,
            matches: vec![None; raw.len()],
            claimed: vec![false; candidates.len()],
        };

        state.run(MatchPass::Exact, |r, c| (raw[r] == candidates[c]).then_some(0));

        if !self.case_sensitive {
            let raw_lower: Vec<String> = raw.iter().map(|s| s.to_lowercase()).collect();
            let cand_lower: Vec<String> = candidates.iter().map(|s| s.to_lowercase()).collect();
            state.run(MatchPass::CaseInsensitive, |r, c| {
                (raw_lower[r] == cand_lower[c]).then_some(0)
            });

            let raw_forms: Vec<NameForms> = raw.iter().map(|s| NameForms::of(s)).collect();
            let cand_forms: Vec<NameForms> = candidates.iter().map(|s| NameForms::of(s)).collect();
            state.run(MatchPass::Normalized, |r, c| {
                raw_forms[r].matches(&cand_forms[c]).then_some(0)
            });

            let min_score = self.options.min_resemblance;
            state.run(MatchPass::Resemblance, |r, c| {
                let score = resemblance(&raw_forms[r], &cand_forms[c]);
                // lower keys win, so invert the score
                (score >= min_score).then_some(u64::from(u32::MAX - score))
            });

            let max_distance = self.options.max_edit_distance;
            state.run(MatchPass::EditDistance, |r, c| {
                let (a, b) = (&raw_forms[r].alnum, &cand_forms[c].alnum);
                if a.is_empty() || b.is_empty() {
                    return None;
                }
                let distance = levenshtein(a, b);
                (distance <= max_distance).then_some(distance as u64)
            });
        }

        raw.iter()
            .zip(state.matches)
            .map(|(name, matched)| match matched {
                Some((c, pass)) => {
                    tracing::trace!(raw = %name, member = candidates[c], ?pass, "resolved column");
                    Resolution {
                        name: candidates[c].to_string(),
                        candidate: Some(c),
                        pass: Some(pass),
                    }
                }
                None => Resolution {
                    name: name.to_string(),
                    candidate: None,
                    pass: None,
                },
            })
            .collect()
    }
}

struct PassState<'a> {
    candidates: &'a [&'a str],
    matches: Vec<Option<(usize, MatchPass)>>,
    claimed: Vec<bool>,
}

impl PassState<'_> {
    /// Run one pass. `key` returns `None` for a non-match, lower keys are better.
    fn run(&mut self, pass: MatchPass, key: impl Fn(usize, usize) -> Option<u64>) {
        for r in 0..self.matches.len() {
            if self.matches[r].is_some() {
                continue;
            }

            let best = (0..self.candidates.len())
                .filter(|&c| !self.claimed[c])
                .filter_map(|c| key(r, c).map(|k| (k, c)))
                .min_by(|(ka, a), (kb, b)| {
                    let (a, b) = (self.candidates[*a], self.candidates[*b]);
                    ka.cmp(kb)
                        .then_with(|| a.chars().count().cmp(&b.chars().count()))
                        .then_with(|| a.cmp(b))
                });

            if let Some((_, c)) = best {
                self.claimed[c] = true;
                self.matches[r] = Some((c, pass));
            }
        }
    }
}

/// Weighted prefix/suffix/substring/token-overlap score between two names
fn resemblance(raw: &NameForms, candidate: &NameForms) -> u32 {
    let (r, c) = (raw.alnum.as_str(), candidate.alnum.as_str());
    if r.is_empty() || c.is_empty() {
        return 0;
    }

    let mut score = 0;
    if c.starts_with(r) || r.starts_with(c) {
        score += PREFIX_WEIGHT;
    }
    if c.ends_with(r) || r.ends_with(c) {
        score += SUFFIX_WEIGHT;
    }
    if c.contains(r) || r.contains(c) {
        score += SUBSTRING_WEIGHT;
    }

    let mut shared: Vec<&String> = raw
        .tokens
        .iter()
        .filter(|t| candidate.tokens.contains(t))
        .collect();
    shared.dedup();
    score + TOKEN_WEIGHT * shared.len() as u32
}

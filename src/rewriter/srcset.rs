//! `srcset` attribute parsing and reassembly
//!
//! A srcset is a comma-separated list of `URL [descriptor]` candidates.
//! Parsing keeps the descriptor attached to its URL so rewriting can swap
//! the URL while preserving `1x`/`2x`/`480w` descriptors verbatim.

/// One srcset candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate {
    pub url: String,
    /// Width or density descriptor (`2x`, `640w`), empty when absent
    pub descriptor: String,
}

/// Parse a srcset attribute into candidates, discarding malformed entries.
#[must_use]
pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate> {
    value
        .split(',')
        .filter_map(|candidate| {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                return None;
            }
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?.to_string();
            if url.is_empty() {
                return None;
            }
            let descriptor = parts.collect::<Vec<_>>().join(" ");
            Some(SrcsetCandidate { url, descriptor })
        })
        .collect()
}

/// Reassemble candidates into a srcset attribute value.
#[must_use]
pub fn format_srcset(candidates: &[SrcsetCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            if c.descriptor.is_empty() {
                c.url.clone()
            } else {
                format!("{} {}", c.url, c.descriptor)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

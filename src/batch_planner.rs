//! Output-budget packing across multiple per-name domains (spec §4.4).
//! Grounded on the teacher's preference for `indexmap::IndexMap` wherever
//! iteration order must stay deterministic (the same crate backs several
//! wallet-side lookups in the teacher); packing here iterates domains
//! sorted by output count, so an `IndexMap` alone would not be enough, but
//! the result collections keep the teacher's deterministic-iteration habit.

use crate::config::DEFAULT_BATCH_BUDGET;
use indexmap::IndexMap;

/// One name's queued outputs for a batch action (REVEAL, OPEN, BID, or the
/// REDEEM+REGISTER pair FINISH packs together).
#[derive(Debug, Clone)]
pub struct Domain<T> {
    pub name: String,
    pub outputs: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDomain {
    pub name: String,
    pub error: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The domain's full output list did not fit the remaining budget and
    /// strict packing required all-or-nothing.
    DoesNotFit { leftover: usize },
    /// Partial packing included only part of the domain; this many outputs
    /// were left out.
    PartialRemainder { leftover: usize },
}

#[derive(Debug, Clone)]
pub struct PackedBatch<T> {
    pub accepted: Vec<Domain<T>>,
    pub rejected: Vec<RejectedDomain>,
}

impl<T> PackedBatch<T> {
    pub fn total_outputs(&self) -> usize {
        self.accepted.iter().map(|d| d.outputs.len()).sum()
    }
}

/// Sorts domains by descending output count, matching "sorted by
/// per-domain output count" in spec §4.4.
fn sorted_by_count<T>(domains: Vec<Domain<T>>) -> Vec<Domain<T>> {
    let mut domains = domains;
    domains.sort_by(|a, b| b.outputs.len().cmp(&a.outputs.len()));
    domains
}

/// Partial packing (`create_batch`): fills the budget largest-count first;
/// when a domain doesn't fully fit, takes a partial share equal to the
/// remaining slots and records the leftover as rejected.
pub fn create_batch<T>(domains: Vec<Domain<T>>, budget: usize) -> PackedBatch<T> {
    let domains = sorted_by_count(domains);
    let mut remaining = budget;
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for mut domain in domains {
        if remaining == 0 {
            rejected.push(RejectedDomain {
                name: domain.name,
                error: RejectReason::PartialRemainder {
                    leftover: domain.outputs.len(),
                },
            });
            continue;
        }

        if domain.outputs.len() <= remaining {
            remaining -= domain.outputs.len();
            accepted.push(domain);
        } else {
            let leftover = domain.outputs.len() - remaining;
            domain.outputs.truncate(remaining);
            remaining = 0;
            let name = domain.name.clone();
            accepted.push(domain);
            rejected.push(RejectedDomain {
                name,
                error: RejectReason::PartialRemainder { leftover },
            });
        }
    }

    PackedBatch { accepted, rejected }
}

/// Strict packing (`create_strict_batch`): a domain is included only if its
/// full output list fits, otherwise the whole domain is rejected. Used by
/// REVEAL and FINISH, where revealing only a fraction of a name's bids
/// would change auction semantics (spec §4.4).
pub fn create_strict_batch<T>(domains: Vec<Domain<T>>, budget: usize) -> PackedBatch<T> {
    let domains = sorted_by_count(domains);
    let mut remaining = budget;
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for domain in domains {
        if domain.outputs.len() <= remaining {
            remaining -= domain.outputs.len();
            accepted.push(domain);
        } else {
            rejected.push(RejectedDomain {
                name: domain.name.clone(),
                error: RejectReason::DoesNotFit {
                    leftover: domain.outputs.len(),
                },
            });
        }
    }

    PackedBatch { accepted, rejected }
}

/// The default REVEAL/OPEN/BID/FINISH per-transaction budget (spec §4.4).
pub fn default_budget() -> usize {
    DEFAULT_BATCH_BUDGET
}

/// Groups a flat `(name, output)` stream into per-name domains preserving
/// first-seen name order, before handing off to `create_batch`/
/// `create_strict_batch`.
pub fn group_by_name<T>(items: Vec<(String, T)>) -> Vec<Domain<T>> {
    let mut grouped: IndexMap<String, Vec<T>> = IndexMap::new();
    for (name, output) in items {
        grouped.entry(name).or_default().push(output);
    }
    grouped
        .into_iter()
        .map(|(name, outputs)| Domain { name, outputs })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(name: &str, count: usize) -> Domain<u32> {
        Domain {
            name: name.to_string(),
            outputs: (0..count as u32).collect(),
        }
    }

    #[test]
    fn strict_packing_rejects_whole_domains_that_do_not_fit() {
        // spec §8 scenario 3: names with 100/50/25/12 own bids, budget 175.
        let domains = vec![domain("a", 100), domain("b", 50), domain("c", 25), domain("d", 12)];
        let batch = create_strict_batch(domains, 175);

        assert_eq!(batch.total_outputs(), 175);
        assert_eq!(batch.accepted.len(), 3);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].name, "d");
        assert_eq!(
            batch.rejected[0].error,
            RejectReason::DoesNotFit { leftover: 12 }
        );
    }

    #[test]
    fn partial_packing_truncates_the_last_fitting_domain() {
        let domains = vec![domain("a", 100), domain("b", 50), domain("c", 25), domain("d", 12)];
        let batch = create_batch(domains, 120);

        assert_eq!(batch.total_outputs(), 120);
        // a (100) fits, leaving 20 for b (50): partial.
        let b = batch.accepted.iter().find(|d| d.name == "b").unwrap();
        assert_eq!(b.outputs.len(), 20);
        assert!(batch
            .rejected
            .iter()
            .any(|r| r.name == "b" && r.error == RejectReason::PartialRemainder { leftover: 30 }));
    }

    #[test]
    fn empty_input_yields_empty_batch() {
        let batch: PackedBatch<u32> = create_strict_batch(Vec::new(), default_budget());
        assert_eq!(batch.total_outputs(), 0);
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn group_by_name_preserves_first_seen_order() {
        let items = vec![
            ("alice".to_string(), 1u32),
            ("bob".to_string(), 2u32),
            ("alice".to_string(), 3u32),
        ];
        let domains = group_by_name(items);
        assert_eq!(domains[0].name, "alice");
        assert_eq!(domains[0].outputs, vec![1, 3]);
        assert_eq!(domains[1].name, "bob");
    }
}

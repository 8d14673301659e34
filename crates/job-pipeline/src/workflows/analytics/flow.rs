use std::collections::BTreeMap;

use serde::Serialize;

use super::views::{FlowEdgeView, FlowGraphView, FlowNodeView};
use super::{log_skipped, ordered_entries};
use crate::workflows::applications::{
    ApplicationHistory, ApplicationId, IntegrityViolation, StatusHistoryEntry,
};
use crate::workflows::catalog::{StatusCatalog, StatusId};

/// Ordered `(from, to)` pair of status ids. Equality is by value, so repeated
/// moves between the same statuses always coalesce into one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeKey {
    pub from: StatusId,
    pub to: StatusId,
}

impl EdgeKey {
    pub const fn new(from: StatusId, to: StatusId) -> Self {
        Self { from, to }
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Streaming fold that turns histories into a weighted status flow graph.
#[derive(Debug, Default)]
pub struct TransitionGraphBuilder {
    edges: BTreeMap<EdgeKey, u32>,
    inbound: BTreeMap<StatusId, u32>,
    outbound: BTreeMap<StatusId, u32>,
    skipped: Vec<IntegrityViolation>,
}

impl TransitionGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, history: &ApplicationHistory) {
        self.push_entries(history.id(), &history.entries);
    }

    /// Fold one application's entries without its record.
    pub fn push_entries(&mut self, application_id: ApplicationId, entries: &[StatusHistoryEntry]) {
        let entries = match ordered_entries(application_id, entries) {
            Ok(entries) => entries,
            Err(violation) => {
                log_skipped("flow_graph", &violation);
                self.skipped.push(violation);
                return;
            }
        };

        if let [only] = &*entries {
            // Parked at its first status: a node without an edge.
            *self.outbound.entry(only.status_id).or_default() += 1;
            return;
        }

        for pair in entries.windows(2) {
            let (from, to) = (pair[0].status_id, pair[1].status_id);
            *self.edges.entry(EdgeKey::new(from, to)).or_default() += 1;
            *self.outbound.entry(from).or_default() += 1;
            *self.inbound.entry(to).or_default() += 1;
        }
    }

    pub fn extend<'a, I>(&mut self, histories: I)
    where
        I: IntoIterator<Item = &'a ApplicationHistory>,
    {
        for history in histories {
            self.push(history);
        }
    }

    pub fn finish(self) -> FlowGraph {
        let Self {
            edges,
            inbound,
            outbound,
            mut skipped,
        } = self;

        let mut throughput = outbound;
        for (status, count) in inbound {
            let slot = throughput.entry(status).or_default();
            *slot = (*slot).max(count);
        }
        skipped.sort();

        FlowGraph {
            edges,
            throughput,
            skipped,
        }
    }
}

/// Status-to-status move counts plus per-status throughput.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowGraph {
    edges: BTreeMap<EdgeKey, u32>,
    throughput: BTreeMap<StatusId, u32>,
    skipped: Vec<IntegrityViolation>,
}

impl FlowGraph {
    pub fn from_histories<'a, I>(histories: I) -> Self
    where
        I: IntoIterator<Item = &'a ApplicationHistory>,
    {
        let mut builder = TransitionGraphBuilder::new();
        builder.extend(histories);
        builder.finish()
    }

    /// Every status that appears in at least one history.
    pub fn nodes(&self) -> impl Iterator<Item = StatusId> + '_ {
        self.throughput.keys().copied()
    }

    pub fn edges(&self) -> &BTreeMap<EdgeKey, u32> {
        &self.edges
    }

    pub fn edge(&self, from: StatusId, to: StatusId) -> u32 {
        self.edges
            .get(&EdgeKey::new(from, to))
            .copied()
            .unwrap_or(0)
    }

    /// `max(inbound, outbound)` for the status; zero when it never appeared.
    pub fn throughput(&self, status: StatusId) -> u32 {
        self.throughput.get(&status).copied().unwrap_or(0)
    }

    pub fn throughputs(&self) -> &BTreeMap<StatusId, u32> {
        &self.throughput
    }

    /// Applications left out because their history broke an invariant.
    pub fn skipped(&self) -> &[IntegrityViolation] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.throughput.is_empty()
    }

    pub fn view(&self, catalog: &StatusCatalog) -> FlowGraphView {
        let nodes = self
            .throughput
            .iter()
            .map(|(&status_id, &throughput)| {
                let status = catalog.status_by_id(status_id).ok();
                FlowNodeView {
                    status_id,
                    name: status.map(|status| status.name.clone()),
                    stage: status.map(|status| status.stage),
                    throughput,
                }
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|(key, &weight)| FlowEdgeView {
                from: key.from,
                to: key.to,
                weight,
            })
            .collect();

        FlowGraphView {
            nodes,
            edges,
            skipped: self.skipped.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::applications::{ApplicationRecord, CompanyId, OwnerId};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn history(id: u64, steps: &[(u32, u32)]) -> ApplicationHistory {
        let application_id = ApplicationId(id);
        let entries: Vec<_> = steps
            .iter()
            .map(|&(status, day)| StatusHistoryEntry {
                application_id,
                timestamp: at(day),
                status_id: StatusId(status),
            })
            .collect();
        let (current, last) = entries
            .last()
            .map(|entry| (entry.status_id, entry.timestamp))
            .unwrap_or((StatusId(1), at(1)));
        ApplicationHistory {
            record: ApplicationRecord {
                id: application_id,
                owner: OwnerId::new("owner@example.com"),
                company_id: CompanyId(1),
                title: "Engineer".to_string(),
                location: "Remote".to_string(),
                applied_date: at(steps.first().map(|step| step.1).unwrap_or(1)),
                current_status_id: current,
                last_record_timestamp: last,
            },
            entries,
        }
    }

    #[test]
    fn single_entry_counts_as_node_without_edges() {
        let graph = FlowGraph::from_histories(&[history(1, &[(4, 1)])]);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.throughput(StatusId(4)), 1);
        assert_eq!(graph.nodes().collect::<Vec<_>>(), vec![StatusId(4)]);
    }

    #[test]
    fn revisiting_a_status_counts_each_direction() {
        let graph = FlowGraph::from_histories(&[history(1, &[(1, 1), (2, 2), (1, 3)])]);
        assert_eq!(graph.edge(StatusId(1), StatusId(2)), 1);
        assert_eq!(graph.edge(StatusId(2), StatusId(1)), 1);
        assert_eq!(graph.edges().len(), 2);
        // status 1: out 1, in 1; status 2: out 1, in 1
        assert_eq!(graph.throughput(StatusId(1)), 1);
        assert_eq!(graph.throughput(StatusId(2)), 1);
    }

    #[test]
    fn duplicate_moves_coalesce_and_throughput_takes_the_larger_side() {
        let histories = [
            history(1, &[(1, 1), (3, 2)]),
            history(2, &[(1, 1), (3, 4), (5, 6)]),
            history(3, &[(2, 2), (3, 3)]),
            history(4, &[(1, 5)]),
        ];
        let graph = FlowGraph::from_histories(&histories);

        assert_eq!(graph.edge(StatusId(1), StatusId(3)), 2);
        assert_eq!(graph.edge(StatusId(2), StatusId(3)), 1);
        assert_eq!(graph.edge(StatusId(3), StatusId(5)), 1);
        assert_eq!(graph.throughput(StatusId(1)), 3);
        assert_eq!(graph.throughput(StatusId(3)), 3);
        assert_eq!(graph.throughput(StatusId(5)), 1);
    }

    #[test]
    fn self_loops_are_counted() {
        let graph = FlowGraph::from_histories(&[history(1, &[(2, 1), (2, 5)])]);
        assert_eq!(graph.edge(StatusId(2), StatusId(2)), 1);
        assert!(graph.edges().keys().all(EdgeKey::is_self_loop));
        assert_eq!(graph.throughput(StatusId(2)), 1);
    }

    #[test]
    fn empty_and_foreign_histories_are_skipped() {
        let mut foreign = history(2, &[(1, 1), (2, 2)]);
        foreign.entries[1].application_id = ApplicationId(99);
        let histories = [history(1, &[]), foreign, history(3, &[(1, 1), (2, 2)])];

        let graph = FlowGraph::from_histories(&histories);
        assert_eq!(graph.edge(StatusId(1), StatusId(2)), 1);
        assert_eq!(
            graph.skipped(),
            &[
                IntegrityViolation::MissingHistory {
                    application_id: ApplicationId(1)
                },
                IntegrityViolation::OrphanHistory {
                    application_id: ApplicationId(99)
                },
            ]
        );
    }

    #[test]
    fn unordered_entries_are_folded_in_timestamp_order() {
        let mut shuffled = history(1, &[(1, 1), (2, 2), (3, 3)]);
        shuffled.entries.swap(0, 2);
        let graph = FlowGraph::from_histories(&[shuffled]);
        assert_eq!(graph.edge(StatusId(1), StatusId(2)), 1);
        assert_eq!(graph.edge(StatusId(2), StatusId(3)), 1);
        assert_eq!(graph.edge(StatusId(3), StatusId(2)), 0);
    }

    #[test]
    fn bare_entry_sequences_fold_like_full_histories() {
        let full = [
            history(1, &[(1, 1), (3, 2), (5, 4)]),
            history(2, &[(2, 1)]),
        ];
        let expected = FlowGraph::from_histories(&full);

        let mut builder = TransitionGraphBuilder::new();
        for history in &full {
            builder.push_entries(history.id(), &history.entries);
        }
        assert_eq!(builder.finish(), expected);
    }

    #[test]
    fn bare_entry_sequences_are_validated() {
        let mut shuffled = history(1, &[(1, 1), (2, 2)]).entries;
        shuffled.reverse();
        let stray = history(7, &[(1, 1)]).entries;

        let mut builder = TransitionGraphBuilder::new();
        builder.push_entries(ApplicationId(1), &shuffled);
        builder.push_entries(ApplicationId(2), &[]);
        builder.push_entries(ApplicationId(3), &stray);
        let graph = builder.finish();

        assert_eq!(graph.edge(StatusId(1), StatusId(2)), 1);
        assert_eq!(graph.edge(StatusId(2), StatusId(1)), 0);
        assert_eq!(
            graph.skipped(),
            &[
                IntegrityViolation::MissingHistory {
                    application_id: ApplicationId(2)
                },
                IntegrityViolation::OrphanHistory {
                    application_id: ApplicationId(7)
                },
            ]
        );
    }

    #[test]
    fn view_labels_nodes_from_catalog() {
        let catalog = StatusCatalog::standard();
        let histories = [history(1, &[(1, 1), (3, 2)]), history(2, &[(42, 1)])];
        let graph = FlowGraph::from_histories(&histories);
        let view = graph.view(&catalog);

        let applied: &FlowNodeView = view
            .nodes
            .iter()
            .find(|node| node.status_id == StatusId(1))
            .expect("applied node");
        assert_eq!(applied.name.as_deref(), Some("Applied"));
        let unknown = view
            .nodes
            .iter()
            .find(|node| node.status_id == StatusId(42))
            .expect("unknown node kept");
        assert!(unknown.name.is_none());
        assert_eq!(view.edges.len(), 1);
        assert_eq!(view.edges[0].weight, 1);
    }
}

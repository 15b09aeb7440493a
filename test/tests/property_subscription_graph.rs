/// PROPERTY-BASED TESTS: Cascading unsubscribe over random link graphs
///
/// Builds a random acyclic set of channel links, explicitly subscribes a random
/// subset of channels and then drops explicit interest in some of them.
///
/// Key invariants:
/// 1. Every remaining entry is explicit or implied by a remaining entry
/// 2. The remaining entries are exactly those reachable from explicit ones
/// 3. Inward and outward edges always mirror each other

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;
use replicant_server::{ChannelLink, ServerConfig, SessionState};
use replicant_shared::{ChangeSetMessage, ChannelAddress};
use replicant_test::{
    instance_address, payload_with_links, test_session_manager, TestDataSource, PERSON,
};

const CHANNEL_COUNT: i32 = 8;

fn channel(index: i32) -> ChannelAddress {
    instance_address(PERSON, index)
}

// Links only point from lower to higher indices, keeping the graph acyclic
fn links_strategy() -> impl Strategy<Value = Vec<(i32, i32)>> {
    prop::collection::vec((0..CHANNEL_COUNT, 0..CHANNEL_COUNT), 0..20).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(source, target)| source < target)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    })
}

fn data_source_with_links(links: &[(i32, i32)]) -> Arc<TestDataSource> {
    let data_source = TestDataSource::new();
    let mut by_source: HashMap<i32, Vec<ChannelLink>> = HashMap::new();
    for (source, target) in links {
        by_source
            .entry(*source)
            .or_default()
            .push(ChannelLink::new(channel(*source), channel(*target), None));
    }
    for (source, channel_links) in by_source {
        data_source.set_content(channel(source), None, payload_with_links(Vec::new(), channel_links));
    }
    Arc::new(data_source)
}

fn reachable_from_explicit(state: &SessionState, links: &[(i32, i32)]) -> BTreeSet<ChannelAddress> {
    let mut reached: BTreeSet<ChannelAddress> = state
        .subscription_entries()
        .filter(|entry| entry.is_explicit())
        .map(|entry| *entry.address())
        .collect();
    let mut frontier: Vec<ChannelAddress> = reached.iter().copied().collect();
    while let Some(address) = frontier.pop() {
        for (source, target) in links {
            if channel(*source) == address && reached.insert(channel(*target)) {
                frontier.push(channel(*target));
            }
        }
    }
    reached
}

fn check_graph(state: &SessionState, links: &[(i32, i32)]) -> Result<(), TestCaseError> {
    let present: BTreeSet<ChannelAddress> =
        state.subscription_entries().map(|entry| *entry.address()).collect();
    prop_assert_eq!(&present, &reachable_from_explicit(state, links));

    for entry in state.subscription_entries() {
        prop_assert!(entry.is_explicit() || entry.has_inward());
        for source in entry.inward() {
            let source_entry = state.subscription_entry(source);
            prop_assert!(source_entry.is_some());
            prop_assert!(source_entry.map_or(false, |source_entry| source_entry.is_linked_to(entry.address())));
        }
        for target in entry.outward() {
            let target_entry = state.subscription_entry(target);
            prop_assert!(target_entry.is_some());
            prop_assert!(target_entry.map_or(false, |target_entry| target_entry.inward().any(|source| source == entry.address())));
        }
    }
    Ok(())
}

proptest! {
    /// Test that unsubscribing leaves exactly the channels still implied
    #[test]
    fn prop_cascade_keeps_only_reachable_entries(
        links in links_strategy(),
        subscribed in prop::collection::btree_set(0..CHANNEL_COUNT, 1..5),
        dropped in prop::collection::vec(0..CHANNEL_COUNT, 1..5),
    ) {
        let (server, _packets) = test_session_manager(ServerConfig::default(), data_source_with_links(&links));
        let session = server.create_session().unwrap();
        let mut state = session.lock();
        let mut change_set = ChangeSetMessage::default();

        for index in &subscribed {
            server.subscribe(&mut state, channel(*index), None, true, &mut change_set).unwrap();
        }
        check_graph(&state, &links)?;

        for index in dropped {
            let address = channel(index);
            let explicit = state
                .subscription_entry(&address)
                .map_or(false, |entry| entry.is_explicit());
            // Only explicit interest can be withdrawn by the client
            if explicit {
                server.unsubscribe(&mut state, &address, true, &mut change_set).unwrap();
            }
            check_graph(&state, &links)?;
        }
    }
}

/// Server subscription graph: implied subscriptions and cascading unsubscribe

use std::sync::Arc;

use replicant_client::AreaOfInterestStatus;
use replicant_server::{ChannelLink, ServerConfig};
use replicant_shared::{
    ChangeSetMessage, ChannelActionMessage, ChannelActionType, ChannelAddress, ClientMessage,
    ServerMessage,
};
use replicant_test::{
    assert_status, entity_key, event, instance_address, is_explicitly_subscribed, payload,
    payload_with_links, person, subscription_requests, test_session_manager, TestDataSource,
    TestHarness, EVENT_TYPE, PERSON, PERSON_EVENTS, PERSON_TYPE, SYSTEM_ID,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn link(source: ChannelAddress, target: ChannelAddress) -> ChannelLink {
    ChannelLink::new(source, target, None)
}

fn actions(change_set: &ChangeSetMessage) -> Vec<(ChannelAddress, ChannelActionType)> {
    change_set
        .channel_actions
        .iter()
        .map(|action| (action.address(SYSTEM_ID), action.action))
        .collect()
}

#[test]
fn unsubscribe_cascades_along_links_in_order() {
    init_logging();
    let data_source = Arc::new(TestDataSource::new());
    let first = instance_address(PERSON, 1);
    let second = instance_address(PERSON_EVENTS, 1);
    let third = instance_address(PERSON, 2);
    data_source.set_content(first, None, payload_with_links(vec![], vec![link(first, second)]));
    data_source.set_content(second, None, payload_with_links(vec![], vec![link(second, third)]));
    let (server, _packets) = test_session_manager(ServerConfig::default(), data_source);
    let session = server.create_session().unwrap();
    let mut state = session.lock();

    let mut change_set = ChangeSetMessage::default();
    server
        .subscribe(&mut state, first, None, true, &mut change_set)
        .unwrap();
    assert_eq!(
        actions(&change_set),
        vec![
            (first, ChannelActionType::Add),
            (second, ChannelActionType::Add),
            (third, ChannelActionType::Add),
        ]
    );
    assert!(!state.subscription_entry(&second).unwrap().is_explicit());
    assert!(state.subscription_entry(&first).unwrap().is_linked_to(&second));

    let mut change_set = ChangeSetMessage::default();
    assert!(server
        .unsubscribe(&mut state, &first, true, &mut change_set)
        .unwrap());
    assert_eq!(
        change_set.channel_actions,
        vec![
            ChannelActionMessage::new(&first, ChannelActionType::Remove, None),
            ChannelActionMessage::new(&second, ChannelActionType::Remove, None),
            ChannelActionMessage::new(&third, ChannelActionType::Remove, None),
        ]
    );
    assert_eq!(state.subscription_entries().count(), 0);
}

#[test]
fn entry_with_another_inward_edge_survives() {
    init_logging();
    let data_source = Arc::new(TestDataSource::new());
    let left = instance_address(PERSON, 1);
    let right = instance_address(PERSON, 2);
    let shared = instance_address(PERSON_EVENTS, 7);
    let beyond = instance_address(PERSON, 9);
    data_source.set_content(left, None, payload_with_links(vec![], vec![link(left, shared)]));
    data_source.set_content(right, None, payload_with_links(vec![], vec![link(right, shared)]));
    data_source.set_content(shared, None, payload_with_links(vec![], vec![link(shared, beyond)]));
    let (server, _packets) = test_session_manager(ServerConfig::default(), data_source);
    let session = server.create_session().unwrap();
    let mut state = session.lock();

    let mut change_set = ChangeSetMessage::default();
    server.subscribe(&mut state, left, None, true, &mut change_set).unwrap();
    server.subscribe(&mut state, right, None, true, &mut change_set).unwrap();
    // The second subscribe only links into the existing entry
    assert_eq!(actions(&change_set).len(), 4);
    assert_eq!(state.subscription_entry(&shared).unwrap().inward().count(), 2);

    let mut change_set = ChangeSetMessage::default();
    server.unsubscribe(&mut state, &left, true, &mut change_set).unwrap();
    assert_eq!(actions(&change_set), vec![(left, ChannelActionType::Remove)]);
    assert!(state.is_subscribed(&shared));
    assert!(state.is_subscribed(&beyond));
    assert_eq!(
        state.subscription_entry(&shared).unwrap().inward().collect::<Vec<_>>(),
        vec![&right]
    );

    let mut change_set = ChangeSetMessage::default();
    server.unsubscribe(&mut state, &right, true, &mut change_set).unwrap();
    assert_eq!(
        actions(&change_set),
        vec![
            (right, ChannelActionType::Remove),
            (shared, ChannelActionType::Remove),
            (beyond, ChannelActionType::Remove),
        ]
    );
}

#[test]
fn explicit_target_outlives_its_source() {
    init_logging();
    let data_source = Arc::new(TestDataSource::new());
    let source = instance_address(PERSON, 1);
    let target = instance_address(PERSON_EVENTS, 1);
    data_source.set_content(source, None, payload_with_links(vec![], vec![link(source, target)]));
    let (server, _packets) = test_session_manager(ServerConfig::default(), data_source);
    let session = server.create_session().unwrap();
    let mut state = session.lock();

    let mut change_set = ChangeSetMessage::default();
    server.subscribe(&mut state, source, None, true, &mut change_set).unwrap();
    server.subscribe(&mut state, target, None, true, &mut change_set).unwrap();
    assert!(state.subscription_entry(&target).unwrap().is_explicit());

    let mut change_set = ChangeSetMessage::default();
    server.unsubscribe(&mut state, &source, true, &mut change_set).unwrap();
    assert_eq!(actions(&change_set), vec![(source, ChannelActionType::Remove)]);
    let entry = state.subscription_entry(&target).unwrap();
    assert!(entry.is_explicit());
    assert!(!entry.has_inward());
}

#[test]
fn explicit_unsubscribe_of_implied_entry_is_answered_with_error() {
    init_logging();
    let data_source = Arc::new(TestDataSource::new());
    let source = instance_address(PERSON, 1);
    let target = instance_address(PERSON_EVENTS, 1);
    data_source.set_content(source, None, payload_with_links(vec![], vec![link(source, target)]));
    let (server, packets) = test_session_manager(ServerConfig::default(), data_source);
    let session = server.create_session().unwrap();
    let session_id = session.id().to_string();

    let subscribe = ClientMessage::Subscribe {
        request_id: 1,
        channel: source.descriptor(),
        filter: None,
    };
    server.handle_message(&session_id, &subscribe.encode().unwrap()).unwrap();
    let unsubscribe = ClientMessage::Unsubscribe {
        request_id: 2,
        channel: target.descriptor(),
    };
    server.handle_message(&session_id, &unsubscribe.encode().unwrap()).unwrap();
    server.flush().unwrap();

    let last = packets.take(&session_id).pop().unwrap();
    assert!(matches!(
        ServerMessage::decode(&last).unwrap(),
        ServerMessage::Error { request_id: Some(2), .. }
    ));
    assert!(session.lock().is_subscribed(&target));
}

#[test]
fn request_failing_while_following_links_changes_nothing() {
    init_logging();
    let mut harness = TestHarness::new();
    let source = instance_address(PERSON, 1);
    let target = instance_address(PERSON_EVENTS, 1);
    harness.data_source.set_content(
        source,
        None,
        payload_with_links(vec![person(1, "Ada", &[source])], vec![link(source, target)]),
    );
    harness.data_source.fail(target);
    harness.connect();
    harness.take_received();

    harness.client.create_area_of_interest(source, None).unwrap();
    harness.pump();

    let received = harness.take_received();
    assert!(received
        .iter()
        .any(|message| matches!(message, ServerMessage::Error { request_id: Some(_), .. })));
    assert!(!received.iter().any(|message| matches!(
        message,
        ServerMessage::ChangeSet(change_set) if !change_set.channel_actions.is_empty()
    )));
    assert!(!harness.session().lock().is_subscribed(&source));
    assert!(!harness.session().lock().is_subscribed(&target));
    assert!(harness.client.state().subscription(&source).is_none());
    assert!(harness.client.state().entities().is_empty());
    assert_status!(harness.client, source, AreaOfInterestStatus::LoadFailed);

    harness.client.dispose_area_of_interest(&source);
    harness.pump();
    assert!(subscription_requests(&harness.take_sent()).is_empty());
    assert_eq!(harness.session().lock().subscription_entries().count(), 0);
    assert!(harness.client.state().subscription(&source).is_none());
}

#[test]
fn client_follows_implied_subscriptions() {
    init_logging();
    let mut harness = TestHarness::new();
    let person_channel = instance_address(PERSON, 1);
    let events_channel = instance_address(PERSON_EVENTS, 1);
    harness.data_source.set_content(
        person_channel,
        None,
        payload_with_links(
            vec![person(1, "Ada", &[person_channel])],
            vec![link(person_channel, events_channel)],
        ),
    );
    harness.data_source.set_content(
        events_channel,
        None,
        payload(vec![
            event(10, "Keynote", 1, &[events_channel]),
            event(11, "Workshop", 1, &[events_channel]),
        ]),
    );
    harness.connect();
    harness.take_sent();

    harness.client.create_area_of_interest(person_channel, None).unwrap();
    harness.pump();

    assert_eq!(subscription_requests(&harness.take_sent()).len(), 1);
    assert_status!(harness.client, person_channel, AreaOfInterestStatus::Loaded);
    assert!(is_explicitly_subscribed(&harness.client, &person_channel));
    let implied = harness.client.state().subscription(&events_channel).unwrap();
    assert!(!implied.is_explicit());
    assert_eq!(implied.entities().count(), 2);
    let keynote = harness
        .client
        .state()
        .entities()
        .get(&entity_key(EVENT_TYPE, 10))
        .unwrap();
    assert_eq!(keynote.reference("personId"), Some(&entity_key(PERSON_TYPE, 1)));

    harness.client.dispose_area_of_interest(&person_channel);
    harness.pump();

    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    assert!(matches!(&requests[0], ClientMessage::Unsubscribe { channel, .. } if channel == "3.1"));
    assert_eq!(harness.client.state().subscriptions().count(), 0);
    assert!(harness.client.state().entities().is_empty());
}

#[test]
fn removing_explicit_interest_in_a_still_implied_channel_keeps_it() {
    init_logging();
    let mut harness = TestHarness::new();
    let person_channel = instance_address(PERSON, 1);
    let events_channel = instance_address(PERSON_EVENTS, 1);
    harness.data_source.set_content(
        person_channel,
        None,
        payload_with_links(vec![], vec![link(person_channel, events_channel)]),
    );
    harness.connect();
    harness.client.create_area_of_interest(person_channel, None).unwrap();
    harness.pump();

    // Declaring interest in the implied channel only promotes it
    harness.client.create_area_of_interest(events_channel, None).unwrap();
    harness.pump();
    assert_status!(harness.client, events_channel, AreaOfInterestStatus::Loaded);
    assert!(is_explicitly_subscribed(&harness.client, &events_channel));
    assert!(harness
        .session()
        .lock()
        .subscription_entry(&events_channel)
        .unwrap()
        .is_explicit());
    harness.take_sent();

    harness.client.dispose_area_of_interest(&events_channel);
    harness.pump();

    assert_eq!(subscription_requests(&harness.take_sent()).len(), 1);
    let subscription = harness.client.state().subscription(&events_channel).unwrap();
    assert!(!subscription.is_explicit());
    let session = harness.session();
    let state = session.lock();
    let entry = state.subscription_entry(&events_channel).unwrap();
    assert!(!entry.is_explicit());
    assert!(entry.has_inward());
}

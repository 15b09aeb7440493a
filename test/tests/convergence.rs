/// Convergence of declared areas of interest into server subscriptions
///
/// Drives a client and a session manager over the in-memory link and checks
/// which subscription requests the converger issues and when.

use replicant_client::{
    AreaOfInterestAction, AreaOfInterestStatus, ClientError, ConvergeOutcome, SpyEvent,
};
use replicant_shared::{ClientMessage, EntityChangeMessage, Filter};
use replicant_test::{
    assert_status, instance_address, is_explicitly_subscribed, payload, person,
    subscription_requests, type_address, TestHarness, DYNAMIC_SEARCH, PEOPLE, PERSON, PERSON_TYPE,
    STATIC_SEARCH, SYSTEM_ID,
};
use serde_json::json;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pending_actions(harness: &TestHarness) -> Vec<AreaOfInterestAction> {
    harness
        .client
        .connector(SYSTEM_ID)
        .and_then(|connector| connector.connection())
        .map(|connection| {
            connection
                .pending_area_of_interest_requests()
                .iter()
                .map(|request| request.action())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn area_of_interest_converges_to_one_explicit_subscription() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);
    harness.data_source.set_content(
        people,
        None,
        payload(vec![person(1, "Ada", &[people]), person(2, "Grace", &[people])]),
    );
    harness.connect();
    harness.take_sent();

    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();

    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    assert!(matches!(
        &requests[0],
        ClientMessage::Subscribe { channel, filter: None, .. } if channel == "2"
    ));
    assert_status!(harness.client, people, AreaOfInterestStatus::Loaded);

    let subscriptions: Vec<_> = harness.client.state().subscriptions().collect();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].address(), &people);
    assert!(subscriptions[0].is_explicit());
    assert_eq!(harness.client.state().entities().len(), 2);
}

#[test]
fn converging_a_settled_client_is_idempotent() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);
    harness.connect();
    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();
    harness.take_sent();

    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::Complete);
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::Complete);
    harness.pump();

    assert!(harness.take_sent().is_empty());
    assert_status!(harness.client, people, AreaOfInterestStatus::Loaded);
}

#[test]
fn reaching_a_new_fixed_point_reports_completion_again() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);
    harness.connect();
    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();
    harness.take_sent();
    harness.take_events();

    // The explicit subscription outlives the area of interest it came from,
    // so the replacement is satisfied without a request
    assert!(harness.client.dispose_area_of_interest(&people));
    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();

    assert!(subscription_requests(&harness.take_sent()).is_empty());
    assert_status!(harness.client, people, AreaOfInterestStatus::Loaded);
    let completions = harness
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, SpyEvent::ConvergeCompleted))
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn orphan_subscription_is_removed_exactly_once() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);
    harness.connect();
    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();
    harness.take_sent();

    assert!(harness.client.dispose_area_of_interest(&people));
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::Submitted(1));
    // The remove is still queued; a second pass must not add another
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::InProgress);
    assert_eq!(pending_actions(&harness), vec![AreaOfInterestAction::Remove]);

    harness.pump();
    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    assert!(matches!(&requests[0], ClientMessage::Unsubscribe { channel, .. } if channel == "2"));
    assert!(harness.client.state().subscription(&people).is_none());
    assert!(!harness.session().lock().is_subscribed(&people));
}

#[test]
fn static_filter_change_resubscribes() {
    init_logging();
    let mut harness = TestHarness::new();
    let search = instance_address(STATIC_SEARCH, 1);
    let first = Filter::new(json!({"name": "a"}));
    let second = Filter::new(json!({"name": "b"}));
    harness.connect();
    harness
        .client
        .create_area_of_interest(search, Some(first.clone()))
        .unwrap();
    harness.pump();
    assert_status!(harness.client, search, AreaOfInterestStatus::Loaded);
    harness.take_sent();

    harness
        .client
        .update_area_of_interest(&search, Some(second.clone()))
        .unwrap();
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::Submitted(1));
    assert_eq!(pending_actions(&harness), vec![AreaOfInterestAction::Remove]);
    // Nothing new until the unsubscribe has completed
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::InProgress);
    assert_eq!(pending_actions(&harness), vec![AreaOfInterestAction::Remove]);

    harness.pump();
    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 2);
    assert!(matches!(&requests[0], ClientMessage::Unsubscribe { channel, .. } if channel == "5.1"));
    assert!(matches!(
        &requests[1],
        ClientMessage::Subscribe { channel, filter: Some(filter), .. }
            if channel == "5.1" && filter == &second
    ));
    assert_status!(harness.client, search, AreaOfInterestStatus::Loaded);
    let subscription = harness.client.state().subscription(&search).unwrap();
    assert_eq!(subscription.filter(), Some(&second));
    assert!(subscription.is_explicit());
}

#[test]
fn dynamic_filter_change_updates_in_place() {
    init_logging();
    let mut harness = TestHarness::new();
    let search = type_address(DYNAMIC_SEARCH);
    let first = Filter::new(json!({"days": 1}));
    let second = Filter::new(json!({"days": 7}));
    harness
        .data_source
        .set_content(search, Some(&first), payload(vec![person(1, "Ada", &[search])]));
    harness.data_source.set_content(
        search,
        Some(&second),
        payload(vec![
            EntityChangeMessage::remove(PERSON_TYPE, 1, &[search]),
            person(2, "Grace", &[search]),
        ]),
    );
    harness.connect();
    harness
        .client
        .create_area_of_interest(search, Some(first))
        .unwrap();
    harness.pump();
    harness.take_sent();

    harness
        .client
        .update_area_of_interest(&search, Some(second.clone()))
        .unwrap();
    harness.pump();

    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    assert!(matches!(
        &requests[0],
        ClientMessage::Subscribe { channel, filter: Some(filter), .. }
            if channel == "6" && filter == &second
    ));
    assert_eq!(harness.data_source.update_calls(), 1);
    assert_status!(harness.client, search, AreaOfInterestStatus::Updated);
    assert_eq!(
        harness.client.state().subscription(&search).unwrap().filter(),
        Some(&second)
    );
    let names: Vec<_> = harness
        .client
        .state()
        .entities()
        .iter()
        .map(|entity| entity.data()["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Grace")]);
}

#[test]
fn compatible_requests_are_sent_as_one_bulk_request() {
    init_logging();
    let mut harness = TestHarness::new();
    let addresses: Vec<_> = (1..=3).map(|id| instance_address(PERSON, id)).collect();
    harness.connect();
    harness.take_sent();

    for address in &addresses {
        harness.client.create_area_of_interest(*address, None).unwrap();
    }
    harness.pump();

    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    match &requests[0] {
        ClientMessage::BulkSubscribe { channels, filter, .. } => {
            assert_eq!(channels, &vec!["3.1", "3.2", "3.3"]);
            assert!(filter.is_none());
        }
        other => panic!("expected a bulk subscribe, got {:?}", other),
    }
    for address in &addresses {
        assert_status!(harness.client, *address, AreaOfInterestStatus::Loaded);
        assert!(is_explicitly_subscribed(&harness.client, address));
    }

    for address in &addresses {
        harness.client.dispose_area_of_interest(address);
    }
    harness.pump();

    let requests = subscription_requests(&harness.take_sent());
    assert_eq!(requests.len(), 1);
    assert!(matches!(&requests[0], ClientMessage::BulkUnsubscribe { channels, .. } if channels.len() == 3));
    assert_eq!(harness.client.state().subscriptions().count(), 0);
}

#[test]
fn nothing_is_requested_while_disconnected() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);

    harness.client.create_area_of_interest(people, None).unwrap();
    assert_eq!(harness.client.converge().unwrap(), ConvergeOutcome::Complete);
    for _ in 0..5 {
        harness.step();
    }

    assert!(harness.take_sent().is_empty());
    assert_status!(harness.client, people, AreaOfInterestStatus::NotAsked);
    assert!(matches!(
        harness.client.request_sync(SYSTEM_ID),
        Err(ClientError::NotConnected { .. })
    ));
}

#[test]
fn failed_load_waits_for_a_filter_change() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);
    harness.data_source.fail(people);
    harness.connect();
    harness.take_sent();

    harness.client.create_area_of_interest(people, None).unwrap();
    harness.pump();

    assert_eq!(subscription_requests(&harness.take_sent()).len(), 1);
    assert_status!(harness.client, people, AreaOfInterestStatus::LoadFailed);
    assert!(harness.client.area_of_interest(&people).unwrap().error().is_some());
    assert!(harness.client.state().subscription(&people).is_none());

    harness.data_source.recover(&people);
    harness.client.update_area_of_interest(&people, None).unwrap();
    harness.pump();

    assert_eq!(subscription_requests(&harness.take_sent()).len(), 1);
    assert_status!(harness.client, people, AreaOfInterestStatus::Loaded);
}

#[test]
fn filter_is_rejected_on_unfiltered_channel() {
    init_logging();
    let mut harness = TestHarness::new();
    let people = type_address(PEOPLE);

    let result = harness
        .client
        .create_area_of_interest(people, Some(Filter::new(json!({"x": 1}))));
    assert!(matches!(result, Err(ClientError::FilterNotPermitted { .. })));
    assert!(harness.client.area_of_interest(&people).is_none());
}

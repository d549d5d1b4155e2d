mod support;

use chrono::{Duration, Utc};
use delivery_pool_engine::{
    db_types::{PackageStatusType, PatronId},
    events::EventProducers,
    traits::{DeliveryPoolDatabase, DeliveryPoolError, NotificationManagement, PatronManagement},
    MatchmakerApi,
    MatchmakerError,
    PatronApi,
};
use support::{active_patron, new_test_db};

#[tokio::test]
async fn request_assigns_the_only_eligible_fulfiller() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    let courier = PatronId::from("courier");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    active_patron(&db, "courier", now).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let (package, fulfiller) = api.request_delivery(&hungry, now).await.expect("Error requesting delivery");
    assert_eq!(fulfiller.patron_id, courier);
    assert_eq!(package.status(), PackageStatusType::Assigned);
    assert_eq!(package.requester_id, hungry);
    assert_eq!(package.fulfiller_id, Some(courier.clone()));
    assert!(package.assigned_at.is_some());

    let incoming = api.incoming_package(&hungry).await.unwrap().expect("Requester should have an open package");
    assert_eq!(incoming.id, package.id);
    let outgoing = api.outgoing_package(&courier).await.unwrap().expect("Fulfiller should have an open package");
    assert_eq!(outgoing.id, package.id);
}

#[tokio::test]
async fn a_second_request_is_rejected_while_the_first_is_open() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    active_patron(&db, "courier", now).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    api.request_delivery(&hungry, now).await.expect("Error requesting delivery");
    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::AlreadyRequesting(id) if id == hungry));
}

#[tokio::test]
async fn only_active_pool_members_may_request() {
    let db = new_test_db().await;
    let now = Utc::now();
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let stranger = PatronId::from("stranger");
    let err = api.request_delivery(&stranger, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::NotInPool(id) if id == stranger));

    // Known but inactive patrons are rejected the same way.
    let lurker = PatronId::from("lurker");
    db.fetch_or_create_patron(&lurker).await.unwrap();
    let err = api.request_delivery(&lurker, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::NotInPool(id) if id == lurker));
}

#[tokio::test]
async fn a_freshly_activated_patron_is_greedy() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    active_patron(&db, "hungry", now).await;
    active_patron(&db, "courier", now).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    match err {
        MatchmakerError::StillFull { patron, remaining } => {
            assert_eq!(patron, hungry);
            assert!(remaining > Duration::minutes(59));
            assert!(remaining <= Duration::hours(1));
        },
        other => panic!("Expected StillFull, got {other:?}"),
    }

    // No package was created by the rejected request.
    assert!(api.incoming_package(&hungry).await.unwrap().is_none());
}

#[tokio::test]
async fn a_request_with_no_fulfiller_stays_queued() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    let queued = match err {
        MatchmakerError::NoFulfillerAvailable { queued } => queued,
        other => panic!("Expected NoFulfillerAvailable, got {other:?}"),
    };
    assert_eq!(queued.status(), PackageStatusType::Unassigned);
    assert_eq!(queued.requester_id, hungry);

    // The queued package counts as the requester's open package.
    let open = api.incoming_package(&hungry).await.unwrap().expect("Queued package should be open");
    assert_eq!(open.id, queued.id);
    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::AlreadyRequesting(_)));
}

#[tokio::test]
async fn a_patron_never_fulfills_their_own_request() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    // The only active patron is the requester themselves.
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::NoFulfillerAvailable { .. }));
}

#[tokio::test]
async fn a_sleeping_fulfiller_is_not_selected_until_their_window_elapses() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    let courier = PatronId::from("courier");
    let earlier = PatronId::from("earlier");
    active_patron(&db, "hungry", now - Duration::hours(3)).await;
    active_patron(&db, "courier", now - Duration::hours(6)).await;
    // "earlier" only exists to give the courier a completed delivery; they never join the active pool.
    db.fetch_or_create_patron(&earlier).await.unwrap();

    // The courier completed a delivery ten minutes ago, so they are sleeping.
    let delivered_at = now - Duration::minutes(10);
    let done = db.create_unassigned_package(&earlier).await.unwrap();
    db.assign_package(done.id, &courier, now - Duration::hours(1)).await.unwrap();
    db.mark_received(done.id, delivered_at).await.unwrap();

    let api = MatchmakerApi::new(db.clone(), EventProducers::default());
    let err = api.request_delivery(&hungry, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::NoFulfillerAvailable { .. }));

    // Once the sleepy window has elapsed the courier is selectable again. The first requester drops out so they
    // don't become a candidate themselves.
    db.deactivate_patron(&hungry).await.unwrap();
    let hungry_too = PatronId::from("hungry_too");
    active_patron(&db, "hungry_too", now - Duration::hours(3)).await;
    let later = delivered_at + Duration::seconds(3601);
    let (_, fulfiller) = api.request_delivery(&hungry_too, later).await.expect("Error requesting delivery");
    assert_eq!(fulfiller.patron_id, courier);
}

#[tokio::test]
async fn a_busy_fulfiller_is_excluded_and_cannot_be_double_booked() {
    let db = new_test_db().await;
    let now = Utc::now();
    let first = PatronId::from("hungry");
    let second = PatronId::from("hungry_too");
    let courier = PatronId::from("courier");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    active_patron(&db, "courier", now).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let (package, fulfiller) = api.request_delivery(&first, now).await.expect("Error requesting delivery");
    assert_eq!(fulfiller.patron_id, courier);

    // With the courier mid-delivery (and the first requester out of the pool), nobody is selectable.
    db.deactivate_patron(&first).await.unwrap();
    active_patron(&db, "hungry_too", now - Duration::hours(2)).await;
    let err = api.request_delivery(&second, now).await.unwrap_err();
    let queued = match err {
        MatchmakerError::NoFulfillerAvailable { queued } => queued,
        other => panic!("Expected NoFulfillerAvailable, got {other:?}"),
    };

    // Forcing the assignment anyway trips the "one open package per fulfiller" invariant.
    let err = db.assign_package(queued.id, &courier, now).await.unwrap_err();
    assert!(matches!(err, DeliveryPoolError::AlreadyFulfilling(id) if id == courier));
    let open = api.outgoing_package(&courier).await.unwrap().expect("The original delivery should still be open");
    assert_eq!(open.id, package.id);
}

#[tokio::test]
async fn back_to_back_operations_never_contend_for_the_store() {
    let db = new_test_db().await;
    let now = Utc::now();
    // Sequential writes across the whole surface must never trip SQLite's writer locking.
    for name in ["amy", "bob", "cat", "dan"] {
        let id = PatronId::from(name);
        db.fetch_or_create_patron(&id).await.expect("Error creating patron");
        db.activate_patron(&id, now - Duration::hours(2)).await.expect("Error activating patron");
    }
    let amy = PatronId::from("amy");
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());
    let (_, fulfiller) = api.request_delivery(&amy, now).await.expect("Error requesting delivery");
    api.acknowledge_receipt(&amy, now).await.expect("Error acknowledging receipt");
    db.enqueue_notification(&fulfiller.patron_id, "Thanks for delivering!")
        .await
        .expect("Error queueing notification");
}

#[tokio::test]
async fn receipt_closes_the_package_and_restarts_the_cooldowns() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    let courier = PatronId::from("courier");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    active_patron(&db, "courier", now - Duration::hours(2)).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let (package, _) = api.request_delivery(&hungry, now).await.expect("Error requesting delivery");
    let en_route = api.acknowledge_en_route(&courier).await.expect("Fulfiller should have an active delivery");
    assert_eq!(en_route.id, package.id);

    let received = api.acknowledge_receipt(&hungry, now).await.expect("Error acknowledging receipt");
    assert_eq!(received.id, package.id);
    assert_eq!(received.status(), PackageStatusType::Received);
    assert!(received.delivered_at.is_some());

    // Both sides are free again, and a second acknowledgement has nothing to act on.
    assert!(api.incoming_package(&hungry).await.unwrap().is_none());
    assert!(api.outgoing_package(&courier).await.unwrap().is_none());
    let err = api.acknowledge_receipt(&hungry, now).await.unwrap_err();
    assert!(matches!(err, MatchmakerError::NoActiveDelivery(_)));
    let err = db.mark_received(package.id, now).await.unwrap_err();
    assert!(err.to_string().contains("Received"));

    // Receipt restarts the requester's greedy window and the fulfiller's sleepy window.
    let patrons = PatronApi::new(db.clone());
    assert!(patrons.is_greedy(&hungry, now).await.unwrap());
    assert!(!patrons.is_greedy(&hungry, now + Duration::seconds(3601)).await.unwrap());
    assert!(patrons.is_sleeping(&courier, now + Duration::minutes(30)).await.unwrap());
    assert!(!patrons.is_sleeping(&courier, now + Duration::seconds(3601)).await.unwrap());

    let stats = patrons.pool_stats().await.unwrap();
    assert_eq!(stats.packages_delivered, 1);
    assert_eq!(stats.active_patrons, 2);
}

#[tokio::test]
async fn concurrent_requests_produce_exactly_one_package() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    active_patron(&db, "courier_1", now).await;
    active_patron(&db, "courier_2", now).await;
    active_patron(&db, "courier_3", now).await;
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let results = tokio::join!(
        api.request_delivery(&hungry, now),
        api.request_delivery(&hungry, now),
        api.request_delivery(&hungry, now),
        api.request_delivery(&hungry, now),
    );
    let results = [results.0, results.1, results.2, results.3];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "Exactly one of the racing requests may win");
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, MatchmakerError::AlreadyRequesting(_)), "Unexpected error: {e:?}");
        }
    }
    let open = api.incoming_package(&hungry).await.unwrap().expect("The winning package should be open");
    assert_eq!(open.status(), PackageStatusType::Assigned);
}

#[tokio::test]
async fn every_candidate_is_eventually_selected() {
    let db = new_test_db().await;
    let now = Utc::now();
    let hungry = PatronId::from("hungry");
    active_patron(&db, "hungry", now - Duration::hours(2)).await;
    db.set_cooldown_overrides(&hungry, true, false).await.unwrap();
    for name in ["courier_1", "courier_2", "courier_3"] {
        active_patron(&db, name, now).await;
    }
    let api = MatchmakerApi::new(db.clone(), EventProducers::default());

    let mut seen = std::collections::HashSet::new();
    for _ in 0..40 {
        let (package, fulfiller) = api.request_delivery(&hungry, now).await.expect("Error requesting delivery");
        seen.insert(fulfiller.patron_id.as_str().to_string());
        // Abandon the delivery so both parties are free for the next round.
        db.mark_failed(package.id).await.unwrap();
    }
    assert_eq!(seen.len(), 3, "Selection starves a candidate: only saw {seen:?}");
}

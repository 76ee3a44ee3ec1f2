//! Behavioural tests for ride synchronisation through the public API.
//!
//! Every scenario runs against the in-memory row store from the
//! `test-support` feature, so no network is involved.

use std::sync::Arc;

use carpool::domain::ports::{FilterOp, GatewayError, Table};
use carpool::domain::{
    ErrorCode, Identity, KeyScope, NewRide, Profile, ProfileService, ProfileUpdate, QueryCache,
    QueryData, QueryKey, QueryStatus, Ride, RideFilter, RideId, RideMutationService,
    RideQueryService, TimeWindow, UserId, filtered_rides_request,
};
use carpool::test_support::{
    GatewayOperation, ImmediateSleeper, InMemoryRowStore, MutableClock, StaticIdentityProvider,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rstest::{fixture, rstest};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
}

fn user(id: &str) -> UserId {
    UserId::new(id).expect("user id")
}

fn ride(id: &str, date: DateTime<Utc>) -> Ride {
    Ride {
        id: RideId::new(id),
        destination: "Airport".to_owned(),
        origin: "Station".to_owned(),
        date,
        user_id: user("u1"),
        name: "Asha".to_owned(),
        profiles: None,
    }
}

fn profile(full_name: Option<&str>) -> Profile {
    Profile {
        id: user("u1"),
        full_name: full_name.map(str::to_owned),
        phone_number: Some("9999999999".to_owned()),
        avatar_url: None,
    }
}

struct World {
    store: Arc<InMemoryRowStore>,
    cache: Arc<QueryCache>,
    queries: RideQueryService<InMemoryRowStore>,
    mutations: RideMutationService<InMemoryRowStore, StaticIdentityProvider>,
    profiles: ProfileService<InMemoryRowStore, StaticIdentityProvider>,
}

impl World {
    fn new(store: InMemoryRowStore) -> Self {
        let store = Arc::new(store);
        let identity = Arc::new(StaticIdentityProvider::signed_in(Identity::new(user("u1"))));
        let clock = Arc::new(MutableClock::new(at(1, 8)));
        let cache = Arc::new(QueryCache::new(clock.clone(), Arc::new(ImmediateSleeper)));
        Self {
            queries: RideQueryService::new(Arc::clone(&store), Arc::clone(&cache)),
            mutations: RideMutationService::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                Arc::clone(&cache),
                clock,
            ),
            profiles: ProfileService::new(Arc::clone(&store), identity, Arc::clone(&cache)),
            store,
            cache,
        }
    }

    fn cached_rides(&self, key: &QueryKey) -> Vec<Ride> {
        self.cache
            .get(key)
            .and_then(|entry| entry.data)
            .and_then(QueryData::into_rides)
            .unwrap_or_default()
    }

    fn cached_ids(&self, key: &QueryKey) -> Vec<String> {
        self.cached_rides(key)
            .into_iter()
            .map(|ride| ride.id.to_string())
            .collect()
    }
}

#[fixture]
fn world() -> World {
    World::new(
        InMemoryRowStore::new()
            .with_profile(&profile(Some("Asha")))
            .with_ride(&ride("r1", at(10, 9)))
            .with_ride(&ride("r2", at(12, 9))),
    )
}

#[rstest]
#[tokio::test]
async fn successful_post_replaces_the_placeholder(world: World) {
    let _observer = world.cache.subscribe(QueryKey::AllRides);
    world.queries.all_rides().await;
    world.store.assign_next_ride_id("r9");

    let posted = world
        .mutations
        .post_ride(NewRide {
            destination: "Airport".to_owned(),
            origin: "Station".to_owned(),
            date: at(10, 14),
        })
        .await
        .expect("post succeeds");

    assert_eq!(posted.id, RideId::new("r9"));
    assert_eq!(posted.name, "Asha");
    assert_eq!(world.cached_ids(&QueryKey::AllRides), ["r1", "r9", "r2"]);
    assert!(
        world
            .cached_rides(&QueryKey::AllRides)
            .iter()
            .all(|ride| !ride.id.is_temporary())
    );
    assert_eq!(
        world.cached_rides(&QueryKey::AllRides),
        world.store.rides(),
        "observed list converges on the server rows"
    );
}

#[rstest]
#[tokio::test]
async fn post_without_a_profile_name_fails_before_any_insert() {
    let world = World::new(
        InMemoryRowStore::new()
            .with_profile(&profile(None))
            .with_ride(&ride("r1", at(10, 9))),
    );
    world.queries.all_rides().await;

    let err = world
        .mutations
        .post_ride(NewRide {
            destination: "Airport".to_owned(),
            origin: "Station".to_owned(),
            date: at(10, 14),
        })
        .await
        .expect_err("profile incomplete");

    assert_eq!(err.code(), ErrorCode::ProfileIncomplete);
    assert_eq!(
        world.store.call_count(GatewayOperation::Insert(Table::Rides)),
        0
    );
    assert_eq!(world.cached_ids(&QueryKey::AllRides), ["r1"]);
}

#[rstest]
#[tokio::test]
async fn failed_delete_restores_the_list(world: World) {
    world.queries.all_rides().await;
    world.store.fail_next(
        GatewayOperation::Delete(Table::Rides),
        GatewayError::backend("42501", "permission denied for table rides"),
    );

    let err = world
        .mutations
        .delete_ride(&RideId::new("r1"))
        .await
        .expect_err("delete refused");

    assert_eq!(err.code(), ErrorCode::GatewayRejected);
    assert_eq!(err.message(), "permission denied for table rides");
    assert_eq!(world.cached_ids(&QueryKey::AllRides), ["r1", "r2"]);
    assert_eq!(world.store.rides().len(), 2);
}

#[rstest]
#[tokio::test]
async fn missing_ride_is_absent_rather_than_an_error(world: World) {
    let state = world.queries.ride_by_id(&RideId::new("r404")).await;

    assert_eq!(state.status, QueryStatus::Success);
    assert!(state.error.is_none());
    assert_eq!(state.data, Some(None));
}

#[rstest]
fn filter_window_spans_from_the_chosen_time_to_next_midnight() {
    let windowed = RideFilter::new(
        "Airport",
        "Station",
        march(10),
        Some(TimeWindow::new(14, 0, 0, 0).expect("window")),
    );
    let whole_day = RideFilter::new("Airport", "Station", march(10), None);

    let bounds = |filter: &RideFilter| {
        filtered_rides_request(filter)
            .filters
            .into_iter()
            .filter(|f| f.column == "date")
            .map(|f| (f.op, f.value))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        bounds(&windowed),
        vec![
            (FilterOp::Gte, "2024-03-10T14:00:00.000Z".to_owned()),
            (FilterOp::Lt, "2024-03-11T00:00:00.000Z".to_owned()),
        ]
    );
    assert_eq!(
        bounds(&whole_day),
        vec![
            (FilterOp::Gte, "2024-03-10T00:00:00.000Z".to_owned()),
            (FilterOp::Lt, "2024-03-11T00:00:00.000Z".to_owned()),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn repeated_invalidation_refetches_once(world: World) {
    let _observer = world.cache.subscribe(QueryKey::AllRides);
    world.queries.all_rides().await;

    world.cache.invalidate(&KeyScope::Rides);
    world.cache.invalidate(&KeyScope::Rides);
    let refetched = world.cache.refetch_pending().await;

    assert_eq!(refetched, 1);
    assert_eq!(
        world.store.call_count(GatewayOperation::Select(Table::Rides)),
        2
    );
}

#[rstest]
#[tokio::test]
async fn profile_edits_do_not_refetch_rides(world: World) {
    let _rides = world.cache.subscribe(QueryKey::AllRides);
    world.queries.all_rides().await;
    world.profiles.fetch_profile().await;

    world
        .profiles
        .update_profile(ProfileUpdate {
            full_name: "Asha Rao".to_owned(),
            phone_number: "8888888888".to_owned(),
            user_id: user("u1"),
        })
        .await
        .expect("profile saved");

    assert_eq!(
        world.store.call_count(GatewayOperation::Select(Table::Rides)),
        1
    );
    assert_eq!(world.cached_ids(&QueryKey::AllRides), ["r1", "r2"]);
}

//! Ride read queries.
//!
//! Each query pairs a [`QueryKey`] with a gateway request and a fetch policy.
//! Listings are joined with the poster's phone number (except the per-user
//! listing) and ordered by departure, earliest first.

use std::sync::Arc;

use chrono::NaiveDate;

use super::ports::{Filter, Order, RowGateway, SelectRequest, Selection, Table};
use super::query_cache::{QueryCache, QueryData, QueryOptions, QueryState, query_fn};
use super::row_codec::{decode_row, decode_rows};
use super::{DateWindow, Error, QueryKey, Ride, RideFilter, RideId, UserId, format_instant};

/// Columns read for ride listings: every ride column plus the poster phone.
pub fn joined_ride_selection() -> Selection {
    Selection::all().join(Table::Profiles, ["phone_number"])
}

/// Request behind [`RideQueryService::all_rides`].
pub fn all_rides_request() -> SelectRequest {
    SelectRequest::new(Table::Rides)
        .select(joined_ride_selection())
        .order(Order::ascending("date"))
}

/// Request behind [`RideQueryService::rides_by_filter`].
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use carpool::domain::{RideFilter, TimeWindow, filtered_rides_request};
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date");
/// let filter = RideFilter::new("Airport", "Station", date, TimeWindow::new(14, 0, 0, 0).ok());
/// let request = filtered_rides_request(&filter);
/// let bounds: Vec<_> = request.filters.iter().map(|f| f.value.as_str()).collect();
/// assert_eq!(
///     bounds,
///     ["%Airport%", "%Station%", "2024-03-10T14:00:00.000Z", "2024-03-11T00:00:00.000Z"],
/// );
/// ```
pub fn filtered_rides_request(filter: &RideFilter) -> SelectRequest {
    let request = SelectRequest::new(Table::Rides)
        .select(joined_ride_selection())
        .filter(Filter::ilike_contains("destination", &filter.destination))
        .filter(Filter::ilike_contains("from", &filter.origin));
    within(request, filter.window()).order(Order::ascending("date"))
}

/// Request behind [`RideQueryService::rides_by_date`].
pub fn rides_by_date_request(date: NaiveDate) -> SelectRequest {
    let request = SelectRequest::new(Table::Rides).select(joined_ride_selection());
    within(request, DateWindow::for_day(date)).order(Order::ascending("date"))
}

/// Request behind [`RideQueryService::rides_by_user`].
pub fn rides_by_user_request(user_id: &UserId) -> SelectRequest {
    SelectRequest::new(Table::Rides).filter(Filter::eq("user_id", user_id.as_str()))
}

/// Request behind [`RideQueryService::ride_by_id`].
pub fn ride_by_id_request(id: &RideId) -> SelectRequest {
    SelectRequest::new(Table::Rides)
        .select(joined_ride_selection())
        .filter(Filter::eq("id", id.as_str()))
        .single()
}

fn within(request: SelectRequest, window: DateWindow) -> SelectRequest {
    request
        .filter(Filter::gte("date", format_instant(window.start)))
        .filter(Filter::lt("date", format_instant(window.end)))
}

async fn fetch_rides<G: RowGateway + ?Sized>(
    gateway: &G,
    request: SelectRequest,
) -> Result<QueryData, Error> {
    let rows = gateway.select(request).await?;
    Ok(QueryData::Rides(decode_rows(rows)?))
}

async fn fetch_user_rides<G: RowGateway + ?Sized>(
    gateway: &G,
    request: SelectRequest,
) -> Result<QueryData, Error> {
    match gateway.select(request).await {
        Ok(rows) => Ok(QueryData::Rides(decode_rows(rows)?)),
        Err(err) if err.is_no_rows() => Ok(QueryData::Rides(Vec::new())),
        Err(err) => Err(err.into()),
    }
}

async fn fetch_single_ride<G: RowGateway + ?Sized>(
    gateway: &G,
    request: SelectRequest,
) -> Result<QueryData, Error> {
    match gateway.select(request).await {
        Ok(rows) => match rows.into_iter().next() {
            Some(row) => Ok(QueryData::Ride(Some(decode_row(row)?))),
            None => Ok(QueryData::Ride(None)),
        },
        Err(err) if err.is_no_rows() => Ok(QueryData::Ride(None)),
        Err(err) => Err(Error::from(err)),
    }
}

#[derive(Clone, Copy)]
enum FetchKind {
    Listing,
    UserListing,
    Single,
}

/// Ride read queries backed by the shared cache.
pub struct RideQueryService<G> {
    gateway: Arc<G>,
    cache: Arc<QueryCache>,
    options: QueryOptions,
}

impl<G> RideQueryService<G>
where
    G: RowGateway + 'static,
{
    /// Build the service with the default fetch policy.
    pub fn new(gateway: Arc<G>, cache: Arc<QueryCache>) -> Self {
        Self {
            gateway,
            cache,
            options: QueryOptions::default(),
        }
    }

    /// Override the baseline fetch policy applied to every ride query.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Every ride, earliest departure first.
    pub async fn all_rides(&self) -> QueryState<Vec<Ride>> {
        self.run_listing(QueryKey::AllRides, all_rides_request(), FetchKind::Listing, true)
            .await
    }

    /// Rides matching a destination/origin search on one day.
    ///
    /// Disabled until both text fragments are filled in.
    pub async fn rides_by_filter(&self, filter: RideFilter) -> QueryState<Vec<Ride>> {
        let enabled = filter.is_complete();
        let request = filtered_rides_request(&filter);
        self.run_listing(
            QueryKey::RidesByFilter(filter),
            request,
            FetchKind::Listing,
            enabled,
        )
        .await
    }

    /// Rides departing on `date`; idle when no date is chosen.
    pub async fn rides_by_date(&self, date: Option<NaiveDate>) -> QueryState<Vec<Ride>> {
        let Some(date) = date else {
            return QueryState::idle();
        };
        self.run_listing(
            QueryKey::RidesByDate(date),
            rides_by_date_request(date),
            FetchKind::Listing,
            true,
        )
        .await
    }

    /// Rides posted by `user_id`; idle when no user is given or `enabled`
    /// is false.
    pub async fn rides_by_user(
        &self,
        user_id: Option<&UserId>,
        enabled: bool,
    ) -> QueryState<Vec<Ride>> {
        let Some(user_id) = user_id else {
            return QueryState::idle();
        };
        self.run_listing(
            QueryKey::RidesByUser(user_id.clone()),
            rides_by_user_request(user_id),
            FetchKind::UserListing,
            enabled,
        )
        .await
    }

    /// One ride. A missing row resolves to `Some(None)` data, not an error.
    pub async fn ride_by_id(&self, id: &RideId) -> QueryState<Option<Ride>> {
        self.run(
            QueryKey::SingleRide(id.clone()),
            ride_by_id_request(id),
            FetchKind::Single,
            true,
        )
        .await
        .project(QueryData::into_ride)
    }

    async fn run_listing(
        &self,
        key: QueryKey,
        request: SelectRequest,
        kind: FetchKind,
        enabled: bool,
    ) -> QueryState<Vec<Ride>> {
        self.run(key, request, kind, enabled)
            .await
            .project(QueryData::into_rides)
    }

    async fn run(
        &self,
        key: QueryKey,
        request: SelectRequest,
        kind: FetchKind,
        enabled: bool,
    ) -> QueryState<QueryData> {
        let gateway = Arc::clone(&self.gateway);
        let fetch = query_fn(move || {
            let gateway = Arc::clone(&gateway);
            let request = request.clone();
            async move {
                match kind {
                    FetchKind::Listing => fetch_rides(gateway.as_ref(), request).await,
                    FetchKind::UserListing => fetch_user_rides(gateway.as_ref(), request).await,
                    FetchKind::Single => fetch_single_ride(gateway.as_ref(), request).await,
                }
            }
        });
        self.cache
            .run_query(key, fetch, self.options.enabled(enabled))
            .await
    }
}

#[cfg(test)]
#[path = "ride_queries_tests.rs"]
mod tests;

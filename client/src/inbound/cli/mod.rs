//! Terminal driver for the ride and profile services.
//!
//! Each command issues one query or mutation intent and renders the result.
//! Nothing here touches the cache directly.

mod render;

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::domain::ports::{IdentityProvider, RowGateway};
use crate::domain::{
    Error, NewRide, ProfileService, ProfileUpdate, ProfileValidationError, QueryState,
    RideFilter, RideId, RideMutationService, RideQueryService, TimeWindow, UserId,
    validate_profile_input,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "carpool", version, about = "Browse and post shared rides")]
pub struct Cli {
    /// OAuth ID token to exchange for a session before running the command.
    #[arg(long, global = true)]
    pub id_token: Option<String>,
    /// Identity provider that issued the ID token.
    #[arg(long, global = true, default_value = "google")]
    pub provider: String,
    /// Action to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported actions.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List every ride, earliest departure first.
    Rides,
    /// Search rides by destination, origin and day.
    Search {
        /// Destination fragment.
        #[arg(long = "to")]
        destination: String,
        /// Origin fragment.
        #[arg(long = "from")]
        origin: String,
        /// Departure day (YYYY-MM-DD, UTC).
        #[arg(long)]
        date: NaiveDate,
        /// Earliest departure time on that day (HH:MM[:SS[.mmm]]).
        #[arg(long)]
        after: Option<TimeWindow>,
    },
    /// List rides departing on one day.
    Day {
        /// Departure day (YYYY-MM-DD, UTC).
        date: NaiveDate,
    },
    /// List rides posted by the signed-in user.
    Mine,
    /// Show one ride.
    Show {
        /// Ride id.
        id: String,
    },
    /// Post a ride as the signed-in user.
    Post {
        /// Destination.
        #[arg(long = "to")]
        destination: String,
        /// Origin.
        #[arg(long = "from")]
        origin: String,
        /// Departure instant (RFC 3339).
        #[arg(long = "at")]
        date: DateTime<Utc>,
    },
    /// Delete a ride.
    Delete {
        /// Ride id.
        id: String,
    },
    /// Show the signed-in user's profile.
    Profile,
    /// Change the signed-in user's name and phone number.
    UpdateProfile {
        /// Full name.
        #[arg(long)]
        name: String,
        /// Ten-digit phone number.
        #[arg(long)]
        phone: String,
    },
}

/// Failures surfaced to the terminal.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A query or mutation failed.
    #[error("{}", .0.message())]
    Domain(#[from] Error),
    /// Profile input was rejected before submission.
    #[error(transparent)]
    Validation(#[from] ProfileValidationError),
    /// Output could not be written.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Services a command may use.
pub struct CliContext<G, I> {
    /// Ride reads.
    pub queries: RideQueryService<G>,
    /// Ride writes.
    pub mutations: RideMutationService<G, I>,
    /// Profile read and edit.
    pub profiles: ProfileService<G, I>,
    /// Session identity.
    pub identity: Arc<I>,
}

/// Execute `command` and write its result to `out`.
///
/// # Errors
///
/// Returns the query or mutation error, a validation error for profile
/// input, or an I/O error from `out`.
pub async fn run<G, I, W>(
    context: &CliContext<G, I>,
    command: Command,
    out: &mut W,
) -> Result<(), CliError>
where
    G: RowGateway + 'static,
    I: IdentityProvider + 'static,
    W: Write,
{
    match command {
        Command::Rides => {
            let rides = settled(context.queries.all_rides().await)?;
            render::rides(out, &rides)?;
        }
        Command::Search {
            destination,
            origin,
            date,
            after,
        } => {
            let filter = RideFilter::new(destination, origin, date, after);
            let rides = settled(context.queries.rides_by_filter(filter).await)?;
            render::rides(out, &rides)?;
        }
        Command::Day { date } => {
            let rides = settled(context.queries.rides_by_date(Some(date)).await)?;
            render::rides(out, &rides)?;
        }
        Command::Mine => {
            match current_user(context.identity.as_ref()).await? {
                Some(user_id) => {
                    let state = context.queries.rides_by_user(Some(&user_id), true).await;
                    render::rides(out, &settled(state)?)?;
                }
                None => render::signed_out(out)?,
            }
        }
        Command::Show { id } => {
            let ride = settled(context.queries.ride_by_id(&RideId::new(id)).await)?;
            render::ride_detail(out, ride.as_ref())?;
        }
        Command::Post {
            destination,
            origin,
            date,
        } => {
            let ride = context
                .mutations
                .post_ride(NewRide {
                    destination,
                    origin,
                    date,
                })
                .await?;
            render::posted(out, &ride)?;
        }
        Command::Delete { id } => {
            let id = RideId::new(id);
            context.mutations.delete_ride(&id).await?;
            render::deleted(out, &id)?;
        }
        Command::Profile => {
            let profile = settled(context.profiles.fetch_profile().await)?;
            render::profile(out, profile.as_ref())?;
        }
        Command::UpdateProfile { name, phone } => {
            validate_profile_input(&name, &phone)?;
            let Some(user_id) = current_user(context.identity.as_ref()).await? else {
                return Err(Error::unauthorized("Sign in to edit your profile.").into());
            };
            let profile = context
                .profiles
                .update_profile(ProfileUpdate {
                    full_name: name,
                    phone_number: phone,
                    user_id,
                })
                .await?;
            render::profile(out, Some(&profile))?;
        }
    }
    Ok(())
}

async fn current_user<I>(identity: &I) -> Result<Option<UserId>, Error>
where
    I: IdentityProvider + ?Sized,
{
    let identity = identity.current_identity().await?;
    Ok(identity.map(|identity| identity.id))
}

/// Unwrap a finished query: its error, or its data (default when idle).
fn settled<T: Default>(state: QueryState<T>) -> Result<T, Error> {
    match (state.error, state.data) {
        (Some(error), _) => Err(error),
        (None, data) => Ok(data.unwrap_or_default()),
    }
}

//! Plain-text rendering of command results.

use std::io::{self, Write};

use crate::domain::{Profile, Ride, RideId, format_instant};

const MISSING: &str = "-";

pub(super) fn rides<W: Write>(out: &mut W, rides: &[Ride]) -> io::Result<()> {
    if rides.is_empty() {
        return writeln!(out, "No rides found.");
    }
    for ride in rides {
        ride_line(out, ride)?;
    }
    Ok(())
}

fn ride_line<W: Write>(out: &mut W, ride: &Ride) -> io::Result<()> {
    writeln!(
        out,
        "{id}\t{date}\t{origin} -> {destination}\t{name}\t{phone}",
        id = ride.id,
        date = format_instant(ride.date),
        origin = ride.origin,
        destination = ride.destination,
        name = ride.name,
        phone = ride.phone_number().unwrap_or(MISSING),
    )
}

pub(super) fn ride_detail<W: Write>(out: &mut W, ride: Option<&Ride>) -> io::Result<()> {
    let Some(ride) = ride else {
        return writeln!(out, "Ride not found.");
    };
    writeln!(out, "id:          {}", ride.id)?;
    writeln!(out, "from:        {}", ride.origin)?;
    writeln!(out, "destination: {}", ride.destination)?;
    writeln!(out, "departs:     {}", format_instant(ride.date))?;
    writeln!(out, "posted by:   {}", ride.name)?;
    writeln!(out, "phone:       {}", ride.phone_number().unwrap_or(MISSING))
}

pub(super) fn posted<W: Write>(out: &mut W, ride: &Ride) -> io::Result<()> {
    write!(out, "Posted ride ")?;
    ride_line(out, ride)
}

pub(super) fn deleted<W: Write>(out: &mut W, id: &RideId) -> io::Result<()> {
    writeln!(out, "Deleted ride {id}.")
}

pub(super) fn profile<W: Write>(out: &mut W, profile: Option<&Profile>) -> io::Result<()> {
    let Some(profile) = profile else {
        return writeln!(out, "No profile yet. Use update-profile to create one.");
    };
    writeln!(out, "name:  {}", profile.display_name().unwrap_or(MISSING))?;
    writeln!(
        out,
        "phone: {}",
        profile.phone_number.as_deref().unwrap_or(MISSING)
    )
}

pub(super) fn signed_out<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Not signed in. Pass --id-token to sign in.")
}

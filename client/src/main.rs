//! Carpool entry-point: loads settings, wires the hosted backend adapters
//! into the ride and profile services, and runs one terminal command.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use carpool::ClientSettings;
use carpool::domain::{
    ProfileService, QueryCache, RideMutationService, RideQueryService, TokioSleeper,
};
use carpool::inbound::cli::{self, Cli, CliContext};
use carpool::outbound::supabase::{SessionStore, SupabaseConnection};
use clap::Parser;
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = Cli::parse();
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => return report(&format!("create Tokio runtime: {err}")),
    };
    match runtime.block_on(async_main(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => report(&message),
    }
}

async fn async_main(args: Cli) -> Result<(), String> {
    let settings = ClientSettings::load_from_iter([OsString::from("carpool")])
        .map_err(|err| format!("load settings: {err}"))?;
    let backend_url = settings.backend_url().map_err(|err| err.to_string())?;
    let api_key = settings.api_key().map_err(|err| err.to_string())?;

    let session = Arc::new(match settings.access_token() {
        Some(token) => SessionStore::with_access_token(token),
        None => SessionStore::new(),
    });
    let connection =
        SupabaseConnection::connect(&backend_url, api_key, settings.request_timeout(), session)
            .map_err(|err| err.to_string())?;

    if let Some(id_token) = args.id_token.as_deref() {
        connection
            .identity
            .sign_in_with_id_token(&args.provider, id_token)
            .await
            .map_err(|err| format!("sign-in failed: {err}"))?;
    }

    let clock = Arc::new(DefaultClock);
    let cache = Arc::new(QueryCache::new(clock.clone(), Arc::new(TokioSleeper)));
    let context = CliContext {
        queries: RideQueryService::new(Arc::clone(&connection.gateway), Arc::clone(&cache))
            .with_options(settings.ride_query_options()),
        mutations: RideMutationService::new(
            Arc::clone(&connection.gateway),
            Arc::clone(&connection.identity),
            Arc::clone(&cache),
            clock,
        ),
        profiles: ProfileService::new(
            Arc::clone(&connection.gateway),
            Arc::clone(&connection.identity),
            cache,
        )
        .with_options(settings.profile_query_options()),
        identity: Arc::clone(&connection.identity),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli::run(&context, args.command, &mut out)
        .await
        .map_err(|err| err.to_string())?;
    out.flush().map_err(|err| format!("flush output: {err}"))
}

fn report(message: &str) -> ExitCode {
    error!(%message, "command failed");
    let mut stderr = io::stderr().lock();
    // Nothing else can be done when stderr itself is closed.
    if writeln!(stderr, "carpool: {message}").is_err() {
        return ExitCode::from(2);
    }
    ExitCode::FAILURE
}

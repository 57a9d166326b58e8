use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore, ReminderScanner,
    ReminderScheduler, SupabaseAppointmentStore,
};
use doctor_cell::{AvailabilityService, BookingLookup, InMemoryScheduleStore, ScheduleStore, SupabaseScheduleStore};
use notification_cell::{
    InMemoryNotificationStore, NotificationDispatcher, NotificationService, NotificationStore,
    SupabaseNotificationStore,
};
use shared_config::AppConfig;

use crate::router::AppServices;

struct Backends {
    appointments: Arc<dyn AppointmentStore>,
    schedule: Arc<dyn ScheduleStore>,
    bookings: Arc<dyn BookingLookup>,
    notification_store: Arc<dyn NotificationStore>,
    notification_sink: Arc<dyn NotificationService>,
}

fn build_backends(config: &AppConfig) -> Backends {
    if config.is_configured() {
        let schedule = Arc::new(SupabaseScheduleStore::new(config));
        let notifications = Arc::new(SupabaseNotificationStore::new(config));

        Backends {
            appointments: Arc::new(SupabaseAppointmentStore::new(config)),
            schedule: schedule.clone(),
            bookings: schedule,
            notification_store: notifications.clone(),
            notification_sink: notifications,
        }
    } else {
        warn!("Supabase is not configured, falling back to in-memory stores");
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());

        Backends {
            appointments: appointments.clone(),
            schedule: Arc::new(InMemoryScheduleStore::new()),
            bookings: appointments,
            notification_store: notifications.clone(),
            notification_sink: notifications,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MediConnect API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    let backends = build_backends(&config);

    // Transitions enqueue notifications; the reminder sweep writes directly so it sees failures
    let dispatcher = Arc::new(NotificationDispatcher::start(
        backends.notification_sink.clone(),
        &config.notifications,
    ));

    let availability = AvailabilityService::new(backends.schedule, backends.bookings);
    let booking = AppointmentBookingService::new(
        backends.appointments.clone(),
        availability.clone(),
        dispatcher.clone(),
    );

    let scanner = ReminderScanner::new(
        backends.appointments,
        backends.notification_sink,
        config.reminders.clone(),
        config.notifications.send_timeout(),
    );
    let reminders = ReminderScheduler::new(scanner, &config.reminders).spawn();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let services = AppServices {
        availability,
        booking,
        notifications: backends.notification_store,
    };
    let app = router::create_router(config.clone(), services).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new()
                        .level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new()
                        .level(Level::INFO)),
            )
            .layer(cors),
    );

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reminders.abort();

    // The router (and every handle to the dispatcher it held) is gone once serve returns
    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => {
            let stats = dispatcher.drain().await;
            info!("Notification dispatcher drained: {:?}", stats);
        }
        Err(_) => warn!("Notification dispatcher still in use, skipping drain"),
    }

    Ok(())
}

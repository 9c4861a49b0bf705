//! Main entry point for the reservation backend server.
//! Wires the booking engine, notification dispatcher and REST API together.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use booking_engine::{
    BookingConfig, BookingEngine, MemoryStore, PgDirectory, PgStore, ReservationStore,
    ResourceDirectory, StaticDirectory,
};
use notification_services::{ConnectionRegistry, Dispatcher, EventBus};
use postgres::database::*;
use uuid::Uuid;
use web_handlers::*;

mod sweep;
use sweep::SweepManager;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn build_state() -> (Arc<dyn ReservationStore>, Arc<dyn ResourceDirectory>) {
    let store_kind = std::env::var("STORE").unwrap_or_else(|_| "postgres".to_string());

    if store_kind == "memory" {
        log::warn!("🧪 Running with the in-memory store; state is not persisted");

        // Seed a demo resource so the API is usable out of the box.
        let resource_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let mut directory = StaticDirectory::new();
        directory.insert(resource_id, owner_id);
        log::info!("🏠 Demo resource {} owned by {}", resource_id, owner_id);

        return (Arc::new(MemoryStore::new()), Arc::new(directory));
    }

    // Create database connection pool
    let pool = match create_connection_pool().await {
        Ok(pool) => {
            log::info!("🗃️ Database pool created successfully");

            if let Err(e) = test_connection(&pool).await {
                log::error!("❌ Database connection test failed: {}", e);
            }
            pool
        }
        Err(e) => {
            log::error!("❌ Failed to create database pool: {}", e);
            log::error!("💡 Make sure PostgreSQL is running, or set STORE=memory");
            std::process::exit(1);
        }
    };

    (
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgDirectory::new(pool)),
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting reservation backend server...");

    let (store, directory) = build_state().await;

    let config = BookingConfig {
        lock_timeout: Duration::from_secs(env_u64("LOCK_TIMEOUT_SECS", 5)),
        auto_confirm: std::env::var("AUTO_CONFIRM").is_ok_and(|v| v == "true"),
    };

    // Event bus between the state machine and the dispatcher
    let bus = EventBus::default();

    let engine = Arc::new(BookingEngine::new(
        store.clone(),
        directory,
        bus.sender(),
        config,
    ));

    // Notification dispatcher with its live connection registry
    let dispatcher = Arc::new(Dispatcher::new(store, Arc::new(ConnectionRegistry::new())));
    {
        let dispatcher = dispatcher.clone();
        let rx = bus.subscribe();
        tokio::spawn(async move { dispatcher.run(rx).await });
    }
    log::info!("📨 Notification dispatcher started");

    // Periodic sweep: completions and expired-block cleanup
    let mut sweep = SweepManager::new(
        engine.clone(),
        Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 60)),
    );
    sweep.start();

    let engine_data = web::Data::from(engine);
    let dispatcher_data = web::Data::from(dispatcher);

    log::info!("🌐 Server will be available at: http://0.0.0.0:8080");

    HttpServer::new(move || {
        App::new()
            .app_data(engine_data.clone())
            .app_data(dispatcher_data.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/reservations")
                            .route("", web::post().to(create_reservation))
                            .route("", web::get().to(list_reservations))
                            .route("/{reservation_id}", web::get().to(get_reservation))
                            .route(
                                "/{reservation_id}/transition",
                                web::post().to(transition_reservation),
                            ),
                    )
                    .route("/availability", web::get().to(check_availability))
                    .service(
                        web::scope("/blocks")
                            .route("", web::post().to(create_block))
                            .route("/{block_id}", web::delete().to(delete_block)),
                    )
                    .service(
                        web::scope("/notifications")
                            .route("", web::get().to(list_notifications))
                            .route("/unread", web::get().to(list_unread_notifications))
                            .route("/stream", web::get().to(stream_notifications))
                            .route(
                                "/{event_id}/read",
                                web::post().to(mark_notification_read),
                            ),
                    ),
            )
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}

use std::net::SocketAddr;

use anyhow::Context;
use rust_inventory::config::Config;
use rust_inventory::db::{create_pool, run_migrations};
use rust_inventory::middleware::AuthLayer;
use rust_inventory::proto::auth::auth_service_server::AuthServiceServer;
use rust_inventory::proto::discussion::discussion_service_server::DiscussionServiceServer;
use rust_inventory::proto::health::health_server::HealthServer;
use rust_inventory::proto::inventory::inventory_service_server::InventoryServiceServer;
use rust_inventory::proto::items::item_service_server::ItemServiceServer;
use rust_inventory::proto::search::search_service_server::SearchServiceServer;
use rust_inventory::proto::users::user_service_server::UserServiceServer;
use rust_inventory::proto::FILE_DESCRIPTOR_SET;
use rust_inventory::services::{
    AuthServiceImpl, DiscussionServiceImpl, HealthServiceImpl, InventoryServiceImpl,
    ItemServiceImpl, SearchServiceImpl, UserServiceImpl,
};

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_inventory=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting rust-inventory gRPC server...");
    tracing::info!("Connecting to database...");

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    if config.run_migrations {
        run_migrations(&pool).await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    // Create services
    let auth_service = AuthServiceImpl::new(pool.clone(), config.jwt_secret.clone(), config.jwt_ttl_hours);
    let user_service = UserServiceImpl::new(pool.clone());
    let inventory_service = InventoryServiceImpl::new(pool.clone());
    let item_service = ItemServiceImpl::new(pool.clone());
    let discussion_service = DiscussionServiceImpl::new(pool.clone());
    let search_service = SearchServiceImpl::new(pool.clone());
    let health_service = HealthServiceImpl::new(pool.clone());

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_addr()))?;
    tracing::info!("Listening on {}", addr);

    // Auth runs innermost so it sees plain gRPC requests after gRPC-Web translation.
    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(TraceLayer::new_for_grpc())
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new())
        .layer(AuthLayer::new(pool.clone(), config.jwt_secret.clone()))
        .add_service(reflection_service)
        .add_service(AuthServiceServer::new(auth_service))
        .add_service(UserServiceServer::new(user_service))
        .add_service(InventoryServiceServer::new(inventory_service))
        .add_service(ItemServiceServer::new(item_service))
        .add_service(DiscussionServiceServer::new(discussion_service))
        .add_service(SearchServiceServer::new(search_service))
        .add_service(HealthServer::new(health_service))
        .serve(addr)
        .await?;

    Ok(())
}

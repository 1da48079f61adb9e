use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context as _;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use networkup::openapi::ApiDoc;
use networkup::repo::Repo;
use networkup::storage::build_upload_store;
use networkup::{config, AppState, RequestTimeout};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Environment comes from the outside (shell, systemd, Docker); load
    // .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping networkup server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(networkup::repo::inmem::InMemRepo::new())
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set for the postgres-store backend")?;
        // An unreachable store at startup is the one fatal condition.
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .context("failed to connect to Postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        info!("Using Postgres repository backend");
        Arc::new(networkup::repo::pg::PgRepo::new(pool))
    };

    let uploads = build_upload_store();
    let upload_root = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3002);

    let state = AppState { repo, uploads };
    let server = HttpServer::new(move || {
        // The original frontend is served separately; stay permissive like
        // its cors() default did.
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(RequestTimeout::from_env())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(Files::new("/uploads", upload_root.clone()))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");

    server.run().await?;
    Ok(())
}

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Key, SameSite};
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use agora::app_config::{self, AppConfig};
use agora::middleware::ClientCtx;
use agora::moderation::{gate::classifier_from_config, ModerationGate};
use agora::storage::local::LocalStorage;
use agora::AppContext;
use anyhow::Context;
use env_logger::Env;
use std::path::PathBuf;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_lib_mods();
    app_config::init();
    let config = app_config::get_config();

    let ctx = build_context(&config).await?;

    let secret_key = match std::env::var("SECRET_KEY") {
        Ok(key) if key.len() >= 64 => Key::from(key.as_bytes()),
        _ => {
            log::warn!("SECRET_KEY is missing or shorter than 64 bytes. Session cookies will be invalidated every time the application is restarted.");
            Key::generate()
        }
    };

    let bind = config.server.bind.clone();
    log::info!("Listening on {}", bind);

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(Data::new(ctx.clone()))
            .wrap(ClientCtx::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(false) // Allow HTTP for development
                    .build(),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .configure(agora::web::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}

/// Initialize third party crates we rely on but don't have control over.
fn init_lib_mods() {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();
}

/// Connects to the database and wires the moderation gate and storage.
async fn build_context(config: &AppConfig) -> anyhow::Result<AppContext> {
    if config.database.url.is_empty() {
        anyhow::bail!("DATABASE_URL or AGORA_DATABASE__URL must be set");
    }
    let db = agora::db::connect(&config.database.url)
        .await
        .context("connecting to the database")?;
    if config.database.create_schema {
        agora::db::create_schema(&db)
            .await
            .context("creating the schema")?;
        agora::db::seed_roles(&db).await.context("seeding roles")?;
    }

    let classifier =
        classifier_from_config(&config.moderation).context("configuring the classifier")?;
    let gate = ModerationGate::new(classifier, &config.moderation);
    let filters = gate
        .reload_filters(&db, config.moderation.profanity_terms.as_slice())
        .await
        .context("loading word filters")?;
    log::info!("Loaded {} word filters", filters);

    let storage = LocalStorage::new(PathBuf::from(&config.storage.local_path))
        .context("opening asset storage")?;

    Ok(AppContext::new(
        db,
        Arc::new(gate),
        Arc::new(storage),
        config.storage.max_image_bytes(),
    ))
}

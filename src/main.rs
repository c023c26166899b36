use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::anyhow;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod ledgers;
mod models;
mod repositories;
mod services;
mod settings;
mod utils;

use ledgers::{promo_codes::PromoCodeLedger, referrals::ReferralLedger};
use repositories::{
    memory::{InMemoryPromoCodeStore, InMemoryReferralStore},
    promo_codes::{PromoCodeRepository, PromoCodeStore},
    referrals::{ReferralRepository, ReferralStore},
};
use services::redemption::RedemptionRequestHandler;
use settings::{Settings, StoreBackend};
use utils::{Clock, SystemClock};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::new(&args.config)?;

    init_logging(&args.log4rs)?;
    log::info!("Starting redemption service.");

    let handler = build_handler(&settings).await?;
    services::start_services(handler, settings).await
}

async fn build_handler(settings: &Settings) -> Result<RedemptionRequestHandler, anyhow::Error> {
    let (promo_codes, referrals): (Arc<dyn PromoCodeStore>, Arc<dyn ReferralStore>) =
        match settings.store.backend {
            StoreBackend::Postgres => {
                let postgres = settings
                    .postgres
                    .as_ref()
                    .ok_or_else(|| anyhow!("Missing [postgres] section for postgres backend."))?;

                let conn = PgPoolOptions::new()
                    .max_connections(postgres.max_connections)
                    .acquire_timeout(Duration::from_secs(postgres.acquire_timeout_secs))
                    .connect(&postgres.url)
                    .await?;
                sqlx::migrate!("./migrations").run(&conn).await?;
                log::info!("Connected to PostgreSQL, migrations applied.");

                let promo_codes: Arc<dyn PromoCodeStore> =
                    Arc::new(PromoCodeRepository::new(conn.clone()));
                let referrals: Arc<dyn ReferralStore> = Arc::new(ReferralRepository::new(conn));
                (promo_codes, referrals)
            }
            StoreBackend::Memory => {
                log::warn!("Using in-memory store, data will not survive a restart.");
                let promo_codes: Arc<dyn PromoCodeStore> = Arc::new(InMemoryPromoCodeStore::new());
                let referrals: Arc<dyn ReferralStore> = Arc::new(InMemoryReferralStore::new());
                (promo_codes, referrals)
            }
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    Ok(RedemptionRequestHandler::new(
        PromoCodeLedger::new(promo_codes, clock.clone()),
        ReferralLedger::new(referrals, clock),
    ))
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow!("Could not initialize logging: {}", e))
        }
    }
}

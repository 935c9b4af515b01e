//! # Checkout Race Simulator
//!
//! Seeds a scarce product and a single-use coupon into a SQLite database,
//! then lets many shoppers check out at the same time and reports who won.
//! Every other shopper carries the coupon.
//!
//! ## Usage
//! ```bash
//! cargo run -p storefront-engine --bin simulate
//! cargo run -p storefront-engine --bin simulate -- --shoppers 50 --stock 3
//! STOREFRONT_DB_PATH=./race.db RUST_LOG=storefront=info cargo run -p storefront-engine --bin simulate
//! ```

use std::env;

use chrono::{Duration, Utc};
use storefront_core::{ClientStatus, CouponDiscount, NewCoupon, Product};
use storefront_db::Client;
use storefront_engine::telemetry::init_tracing;
use storefront_engine::{Engine, EngineConfig, EngineError};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut shoppers: usize = 20;
    let mut stock: i64 = 5;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--shoppers" | "-n" => {
                if i + 1 < args.len() {
                    shoppers = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Checkout Race Simulator");
                println!();
                println!("Usage: simulate [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --shoppers <N>   Concurrent shoppers (default: 20)");
                println!("  -s, --stock <N>      Units of the scarce product (default: 5)");
                println!("  -h, --help           Show this help message");
                println!();
                println!("The database path comes from STOREFRONT_DB_PATH.");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = EngineConfig::from_env()?;
    info!(db = %config.db_path.display(), shoppers, stock, "Starting simulation");

    let (engine, backend) = Engine::open_sqlite(&config).await?;
    let db = backend.database();

    // Fresh ids so repeated runs against one file do not collide
    let run = Uuid::new_v4().simple().to_string();
    let run = &run[..8];
    let product_id = format!("scarce-{}", run);
    let coupon_code = format!("RACE-{}", run.to_uppercase());

    let now = Utc::now();
    db.products()
        .insert(&Product::new(&product_id, "Limited Run Sneaker", 12_000, stock, now)?)
        .await?;

    engine
        .create_coupon(NewCoupon {
            code: coupon_code.clone(),
            discount: CouponDiscount::Percentage { percent: 15 },
            valid_from: now - Duration::minutes(1),
            valid_until: now + Duration::hours(1),
            max_uses: 1,
            active: true,
            minimum_purchase_minor: 0,
        })
        .await?;

    let mut ids = Vec::with_capacity(shoppers);
    for n in 0..shoppers {
        let id = format!("shopper-{}-{}", run, n);
        let mut client = Client::new(&id, format!("Shopper {}", n));
        client.status = ClientStatus::Active;
        db.clients().upsert(&client).await?;

        engine.add_item(&id, &product_id, 1).await?;
        // Half the shoppers also race for the single coupon use
        if n % 2 == 0 {
            engine.apply_coupon(&id, &coupon_code).await?;
        }
        ids.push(id);
    }

    println!("🏁 {} shoppers racing for {} units", shoppers, stock);

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let result = engine.checkout(&id).await;
            (id, result)
        }));
    }

    let mut full_price = 0;
    let mut discounted = 0;
    let mut out_of_stock = 0;
    let mut coupon_gone = 0;
    let mut other = 0;

    for handle in handles {
        let (id, result) = handle.await?;
        match result {
            Ok(purchase) if purchase.coupon_code.is_some() => {
                discounted += 1;
                println!("  ✓ {} paid {} with the coupon", id, purchase.total_paid_minor);
            }
            Ok(purchase) => {
                full_price += 1;
                println!("  ✓ {} paid {}", id, purchase.total_paid_minor);
            }
            Err(EngineError::InsufficientStock { .. }) => out_of_stock += 1,
            Err(EngineError::CouponExhausted { .. }) => coupon_gone += 1,
            Err(e) => {
                other += 1;
                println!("  ✗ {}: {}", id, e);
            }
        }
    }

    let remaining = engine.available_stock(&product_id).await?;
    let coupon = engine.get_coupon(&coupon_code).await?;

    println!();
    println!("📊 Results");
    println!("  Sold with coupon:   {}", discounted);
    println!("  Sold at full price: {}", full_price);
    println!("  Out of stock:       {}", out_of_stock);
    println!("  Coupon exhausted:   {}", coupon_gone);
    println!("  Other errors:       {}", other);
    println!("  Stock left:         {}", remaining);
    println!(
        "  Coupon uses:        {}/{} ({} left)",
        coupon.used_count,
        coupon.max_uses,
        coupon.remaining_uses()
    );

    Ok(())
}

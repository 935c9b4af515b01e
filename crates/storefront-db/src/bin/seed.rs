//! # Seed Data Generator
//!
//! Populates a development database with products, clients and coupons.
//!
//! ## Usage
//! ```bash
//! cargo run -p storefront-db --bin seed
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//! ```

use chrono::{Duration, Utc};
use std::env;
use storefront_core::{ClientStatus, Coupon, CouponDiscount, NewCoupon, Product};
use storefront_db::repository::product::generate_product_id;
use storefront_db::{Client, Database, DbConfig};
use uuid::Uuid;

/// (name, price in minor units, stock)
const PRODUCTS: &[(&str, i64, i64)] = &[
    ("Wireless Mouse", 1_999, 40),
    ("Mechanical Keyboard", 8_950, 15),
    ("USB-C Cable 1m", 599, 200),
    ("27\" Monitor", 21_900, 6),
    ("Laptop Stand", 3_450, 25),
    ("Webcam 1080p", 4_990, 12),
    ("Noise Cancelling Headphones", 17_500, 8),
    ("Desk Lamp", 2_800, 30),
    ("Limited Edition Mug", 1_200, 1),
];

/// (id, name, status)
const CLIENTS: &[(&str, &str, ClientStatus)] = &[
    ("client-ana", "Ana Torres", ClientStatus::Active),
    ("client-luis", "Luis Pérez", ClientStatus::Pending),
    ("client-eva", "Eva Ruiz", ClientStatus::Rejected),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    for (name, price_minor, stock) in PRODUCTS {
        let product = Product::new(&generate_product_id(), name, *price_minor, *stock, now)?;
        db.products().insert(&product).await?;
        println!("  + product {:<30} {:>7} × {:>3}", product.name, product.price_minor, product.stock);
    }

    for (id, name, status) in CLIENTS {
        let mut client = Client::new(*id, *name);
        client.status = *status;
        db.clients().upsert(&client).await?;
        println!("  + client  {:<30} {:?}", client.name, client.status);
    }

    let coupons = [
        NewCoupon {
            code: "SAVE10".to_string(),
            discount: CouponDiscount::Percentage { percent: 10 },
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            max_uses: 100,
            active: true,
            minimum_purchase_minor: 500,
        },
        NewCoupon {
            code: "WELCOME5".to_string(),
            discount: CouponDiscount::Fixed { amount_minor: 500 },
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
            max_uses: 1,
            active: true,
            minimum_purchase_minor: 2_000,
        },
    ];

    for new in coupons {
        let coupon = Coupon::issue(new.validate()?, Uuid::new_v4().to_string(), now);
        db.coupons().insert(&coupon).await?;
        println!("  + coupon  {:<30} max uses {}", coupon.code, coupon.max_uses);
    }

    println!();
    println!(
        "✓ Seeded {} products, {} clients, 2 coupons",
        PRODUCTS.len(),
        CLIENTS.len()
    );

    Ok(())
}

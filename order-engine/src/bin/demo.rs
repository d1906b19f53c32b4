//! End-to-end walkthrough of the Lumina order engine
//!
//! Runs every lifecycle flow against a scratch data directory: escrow
//! create/ship/confirm, the anti-fraud pair dedup, map lighting across
//! provinces, the auto-confirm sweep, and a refund round trip.

use anyhow::Result;
use market_core::{AccountId, Province, ShippingAddress};
use order_engine::{
    AutoConfirmSweep, EngineConfig, ListingRequest, OrderEngine, OrderRole, Shipment,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let data_dir = std::env::temp_dir().join(format!("lumina-demo-{}", Uuid::new_v4()));
    let config = EngineConfig {
        data_dir: data_dir.clone(),
        // Shipped orders fall due immediately so the sweep has work to do
        auto_confirm_days: 0,
        ..Default::default()
    };
    let sweep_period = Duration::from_secs(config.sweep_interval_secs);
    let engine = Arc::new(OrderEngine::open(config)?);

    println!("Lumina order engine demo");
    println!("scratch data: {}", data_dir.display());
    println!("\ntitle ladder:");
    for title in engine.titles() {
        println!(
            "  level {} {:<14} {} provinces",
            title.level, title.name, title.required_provinces
        );
    }

    println!("\n=== Act 1: accounts and listings ===");
    let buyer = engine
        .directory()
        .register("li hua", Some(Province::new("Hunan")?), dec!(500.00))?;
    let tea_seller = engine
        .directory()
        .register("wang gong", Some(Province::new("Yunnan")?), dec!(100.00))?;
    let carver = engine
        .directory()
        .register("zhao shi", Some(Province::new("Hainan")?), dec!(50.00))?;
    println!("registered buyer {} with 500.00", buyer.account_id);

    let tea = engine.catalog().list_product(
        tea_seller.account_id,
        ListingRequest {
            title: "Pu'er tea cake".to_string(),
            price: dec!(40.00),
            province: Province::new("Yunnan")?,
            stock: 3,
        },
    )?;
    let carving = engine.catalog().list_product(
        carver.account_id,
        ListingRequest {
            title: "Coconut shell carving".to_string(),
            price: dec!(25.00),
            province: Province::new("Hainan")?,
            stock: 1,
        },
    )?;

    println!("\n=== Act 2: escrow lifecycle ===");
    let order = engine
        .create_order(buyer.account_id, tea.product_id, address())
        .await?;
    println!("order {} created", order.order_no);
    print_balance(&engine, "buyer after create", &buyer.account_id)?;

    engine
        .ship_order(order.order_id, tea_seller.account_id, shipment("SF1001", "Yunnan"))
        .await?;
    engine
        .confirm_receipt(order.order_id, buyer.account_id)
        .await?;
    print_balance(&engine, "buyer after confirm", &buyer.account_id)?;
    print_balance(&engine, "seller after confirm", &tea_seller.account_id)?;
    print_progress(&engine, &buyer.account_id)?;

    println!("\n=== Act 3: repeat pair is not rewarded twice ===");
    let repeat = engine
        .create_order(buyer.account_id, tea.product_id, address())
        .await?;
    engine
        .ship_order(repeat.order_id, tea_seller.account_id, shipment("SF1002", "Yunnan"))
        .await?;
    engine
        .confirm_receipt(repeat.order_id, buyer.account_id)
        .await?;
    print_progress(&engine, &buyer.account_id)?;

    println!("\n=== Act 4: a new province lights up ===");
    let island = engine
        .create_order(buyer.account_id, carving.product_id, address())
        .await?;
    engine
        .ship_order(island.order_id, carver.account_id, shipment("YT2001", "Hainan"))
        .await?;
    engine
        .confirm_receipt(island.order_id, buyer.account_id)
        .await?;
    print_progress(&engine, &buyer.account_id)?;

    println!("\n=== Act 5: auto-confirm sweep ===");
    let lingering = engine
        .create_order(buyer.account_id, tea.product_id, address())
        .await?;
    engine
        .ship_order(lingering.order_id, tea_seller.account_id, shipment("SF1003", "Yunnan"))
        .await?;
    println!("order {} shipped and already past due", lingering.order_no);

    let sweep = AutoConfirmSweep::new(Arc::clone(&engine), sweep_period);
    sweep.tick().await;
    let stats = sweep.stats();
    println!(
        "sweep tick: {} confirmed ({} ticks total)",
        stats.orders_confirmed, stats.ticks
    );
    print_balance(&engine, "seller after sweep", &tea_seller.account_id)?;

    println!("\n=== Act 6: refund round trip ===");
    let regret = engine.catalog().list_product(
        tea_seller.account_id,
        ListingRequest {
            title: "Tieguanyin oolong".to_string(),
            price: dec!(30.00),
            province: Province::new("Fujian")?,
            stock: 1,
        },
    )?;
    let refund_order = engine
        .create_order(buyer.account_id, regret.product_id, address())
        .await?;
    print_balance(&engine, "buyer after create", &buyer.account_id)?;
    engine
        .request_refund(refund_order.order_id, buyer.account_id, "changed my mind")
        .await?;
    engine
        .process_refund(refund_order.order_id, true, "unused, seller agrees")
        .await?;
    print_balance(&engine, "buyer after refund", &buyer.account_id)?;
    let restocked = engine.catalog().get(&regret.product_id)?;
    println!("product restocked: {} in stock", restocked.stock);

    println!("\n=== Act 7: audit trail ===");
    let trail = engine.order_audit(&order.order_id)?;
    println!("{}", serde_json::to_string_pretty(&trail)?);

    let history = engine.orders_for(&buyer.account_id, OrderRole::Buyer)?;
    println!("\nbuyer placed {} orders", history.len());
    let stats = engine.storage_stats()?;
    println!(
        "store: {} accounts, {} products, {} orders, {} audit events",
        stats.total_accounts, stats.total_products, stats.total_orders, stats.total_audit_events
    );

    drop(sweep);
    drop(engine);
    std::fs::remove_dir_all(&data_dir).ok();
    Ok(())
}

fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "li hua".to_string(),
        phone: "13800000000".to_string(),
        city: Some("Changsha".to_string()),
        detail: "99 Xiangjiang Middle Rd".to_string(),
    }
}

fn shipment(tracking_no: &str, province: &str) -> Shipment {
    Shipment {
        tracking_no: tracking_no.to_string(),
        carrier: "SF Express".to_string(),
        province: Province::new(province).expect("province name"),
    }
}

fn print_balance(engine: &OrderEngine, label: &str, account_id: &AccountId) -> Result<()> {
    let (available, frozen) = engine.balance(account_id)?;
    println!("{}: {} available, {} frozen", label, available, frozen);
    Ok(())
}

fn print_progress(engine: &OrderEngine, account_id: &AccountId) -> Result<()> {
    let progress = engine.map_progress(account_id)?;
    let provinces: Vec<&str> = progress
        .footprints
        .iter()
        .map(|f| f.province.as_str())
        .collect();
    println!(
        "map: {} lit {:?}, title level {} ({}), {:.1}% toward {}",
        progress.provinces_lit,
        provinces,
        progress.title_level,
        progress
            .current_title
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("none"),
        progress.progress_pct,
        progress
            .next_title
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("top of the ladder"),
    );
    Ok(())
}

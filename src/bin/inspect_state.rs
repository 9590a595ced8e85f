use gold_tracker_lib::fetcher::metalprice::MetalPriceFetcher;
use gold_tracker_lib::{config::Config, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db_path = config.data_dir.join("gold_tracker.db");

    println!("Connecting to: {:?}", db_path);

    if !db_path.exists() {
        println!("DB not found");
        return Ok(());
    }

    let pool = db::init(&config.data_dir).await?;
    let rows = db::list_state(&pool).await?;

    println!("{:<20} | {:<20} | {:<8} | {}", "Key", "Updated", "Bytes", "Value");
    println!("{}", "-".repeat(100));

    for (key, value, updated_at) in rows {
        let preview: String = value.chars().take(60).collect();
        println!(
            "{:<20} | {:<20} | {:<8} | {}{}",
            key,
            updated_at.unwrap_or_else(|| "N/A".to_string()),
            value.len(),
            preview,
            if value.chars().count() > 60 { "..." } else { "" }
        );
    }

    let usage_key = MetalPriceFetcher::usage_key();
    let used = db::get_api_usage(&pool, &usage_key).await?;
    println!("\nMetalpriceAPI requests this month: {} / {}", used, config.metalprice_monthly_limit);

    Ok(())
}

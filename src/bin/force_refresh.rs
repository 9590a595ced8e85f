use gold_tracker_lib::{build_oracle, config::Config, host, init_tracing};

/// Runs one refresh cycle for the persisted (or given) selection and prints the result.
///
/// Usage: force_refresh [CURRENCY] [KARAT]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_filter);

    let (mut oracle, _pool) = build_oracle(&config).await?;

    let mut selection = oracle.state().selection.clone();
    let mut args = std::env::args().skip(1);
    if let Some(currency) = args.next() {
        selection.currency = currency.to_ascii_uppercase();
    }
    if let Some(karat) = args.next() {
        selection.karat = karat.trim_end_matches(['k', 'K']).parse()?;
    }

    println!("Refreshing {} {}K...", selection.currency, selection.karat);
    match oracle.refresh(&selection).await {
        Ok(report) => {
            println!("{}", host::format_quote(&report.quote));
            if let Some(notice) = &report.notice {
                println!("notice: {}", notice);
            }
            println!("{}", host::format_chart(&report.chart));
        }
        Err(e) => println!("Refresh failed: {}", e),
    }

    Ok(())
}

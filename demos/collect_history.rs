use eyre::Result;
use scrape_liteserver_data::{
    collect_pool_history, contracts, endpoints, output, ContractAddress, LiteClient, RunConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RunConfig::from_env()?;
    info!(
        pool = config.pool.as_str(),
        start = %config.start,
        end = %config.end,
        "starting historical replay"
    );

    // Endpoint directory failure is fatal: nothing ran yet
    let endpoints = endpoints::fetch_endpoints(&config.config_url).await?;
    let mut client = LiteClient::new(endpoints)?;

    let account = ContractAddress::parse_friendly(contracts::pool_address(config.pool))?;
    let assets = contracts::pool_assets(config.pool);

    let (reserves, totals) =
        collect_pool_history(&mut client, &account, &assets, config.start, config.end).await;
    client.close().await;

    println!(
        "Collected {} reserve samples and {} totals samples",
        reserves.len(),
        totals.len()
    );

    // Write failures are reported but do not invalidate the collected run
    if let Err(err) = output::write_series(&output::reserves_filename(config.pool), &reserves).await
    {
        warn!(%err, "failed to persist reserves series");
    } else {
        println!("Wrote {}", output::reserves_filename(config.pool));
    }
    if let Err(err) = output::write_series(&output::totals_filename(config.pool), &totals).await {
        warn!(%err, "failed to persist totals series");
    } else {
        println!("Wrote {}", output::totals_filename(config.pool));
    }

    Ok(())
}

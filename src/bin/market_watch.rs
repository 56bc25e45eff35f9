//! Watch one Bitfinex market from the terminal.
//!
//! Configuration comes from `BFX_*` variables (a `.env` file is honoured).
//! Log level follows `RUST_LOG`, default `info`.
//!
//! ```text
//! BFX_SYMBOL=ETHUSD BFX_INTERVAL=1h cargo run --features cli --bin market-watch
//! ```

use bfx_market::prelude::*;
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MarketConfig::from_env()?;
    tracing::info!(symbol = %config.symbol, interval = %config.interval, "Starting market watch");

    let client = MarketClient::builder().config(config).build()?;
    let stream = client.stream()?;

    {
        let mut events = stream.events();
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => print_event(&event),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    stream.shutdown().await;
    Ok(())
}

fn print_event(event: &MarketEvent) {
    match event {
        MarketEvent::Connection(state) => println!("connection: {state:?}"),
        MarketEvent::Candles {
            interval,
            bars,
            summary,
        } => {
            let change = &summary.change;
            let at = bars
                .last()
                .and_then(|bar| bar.datetime())
                .map(|time| time.format("%Y-%m-%d %H:%M").to_string());
            println!(
                "candles {interval}: {} bars to {}, last {} ({:?} {} / {:.2}%)",
                bars.len(),
                at.as_deref().unwrap_or("-"),
                summary.last_price,
                change.direction,
                change.amount,
                change.percentage
            );
        }
        MarketEvent::Book(view) => {
            let bid = view.bids.first().map(|row| row.price.to_string());
            let ask = view.asks.first().map(|row| row.price.to_string());
            println!(
                "book: {} bids / {} asks, best bid {} ask {}",
                view.bids.len(),
                view.asks.len(),
                bid.as_deref().unwrap_or("-"),
                ask.as_deref().unwrap_or("-")
            );
        }
    }
}

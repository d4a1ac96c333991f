//! Daily replay of lending-pool getters against historical account state.
//!
//! For each calendar day in a range, the driver resolves the nearest
//! preceding block, fetches the pool contract's frozen state, installs it in
//! an isolated sandbox and queries every registered asset's reserves and
//! totals, accumulating two time-series. Days are processed strictly in
//! sequence with one request in flight at a time.

pub mod boc;
pub mod client;
pub mod config;
pub mod contracts;
pub mod endpoints;
pub mod output;
pub mod sandbox;
pub mod types;
pub mod wire;

use alloy_primitives::U256;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::boc::{Cell, DecodeError};
use crate::client::ProtocolError;
use crate::sandbox::{Blockchain, GetterCallError, ShardAccount, StackValue};

pub use crate::client::LiteClient;
pub use crate::config::RunConfig;
pub use crate::types::{
    Asset, BlockId, ContractAddress, DailySample, Pool, ReserveEntry, TimeSeries, TotalsEntry,
    MASTERCHAIN, PLACEHOLDER_BALANCE, SHARD_FULL,
};

/// Block resolution, state fetch and decode share the same scope: any of
/// them failing skips the whole day.
#[derive(Debug, Error)]
enum DayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Replay both getters for every asset over every day in `[start, end]`.
///
/// Returns the reserves and totals series in ascending date order. A day
/// whose block resolution, state fetch or decode fails contributes no
/// sample; a single asset's getter failure omits only that asset from both
/// of the day's entry lists.
pub async fn collect_pool_history(
    client: &mut LiteClient,
    account: &ContractAddress,
    assets: &[Asset],
    start: NaiveDate,
    end: NaiveDate,
) -> (TimeSeries<ReserveEntry>, TimeSeries<TotalsEntry>) {
    let mut reserves: TimeSeries<ReserveEntry> = Vec::new();
    let mut totals: TimeSeries<TotalsEntry> = Vec::new();

    let mut day = start;
    while day <= end {
        let timestamp = day_start_unix(day);
        match process_date(client, account, timestamp as u32).await {
            Ok((code, data)) => {
                let chain = Blockchain::new(
                    ShardAccount {
                        address: account.clone(),
                        code,
                        data,
                        balance: PLACEHOLDER_BALANCE,
                    },
                    timestamp as u32,
                );

                let mut day_reserves = Vec::with_capacity(assets.len());
                let mut day_totals = Vec::with_capacity(assets.len());
                for asset in assets {
                    match query_asset(&chain, asset) {
                        Ok((reserve_entry, totals_entry)) => {
                            day_reserves.push(reserve_entry);
                            day_totals.push(totals_entry);
                        }
                        Err(err) => {
                            warn!(asset = %asset.name, address = %asset.address, %err, "unable to process asset");
                        }
                    }
                }

                info!(date = %day, assets = day_reserves.len(), "account replayed");
                reserves.push(DailySample {
                    timestamp,
                    entries: day_reserves,
                });
                totals.push(DailySample {
                    timestamp,
                    entries: day_totals,
                });
            }
            Err(err) => warn!(date = %day, %err, "skipping day"),
        }

        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    (reserves, totals)
}

/// Resolve the day's block, fetch the account state and split it into
/// (code, storage).
async fn process_date(
    client: &mut LiteClient,
    account: &ContractAddress,
    utime: u32,
) -> Result<(Arc<Cell>, Arc<Cell>), DayError> {
    let block = client.lookup_block(MASTERCHAIN, SHARD_FULL, utime).await?;
    let raw = client.get_account_state(account, &block).await?;
    Ok(boc::decode_account_state(&raw)?)
}

/// Run both getters for one asset, scaling the raw integers by the asset's
/// decimal precision.
fn query_asset(
    chain: &Blockchain,
    asset: &Asset,
) -> Result<(ReserveEntry, TotalsEntry), GetterCallError> {
    let key = StackValue::Int(U256::from_be_bytes(asset.key.0));

    let stack = chain.run_get_method(contracts::GET_ASSET_RESERVES, std::slice::from_ref(&key))?;
    let reserve = sandbox::stack_int(&stack, 0)?;

    let stack = chain.run_get_method(contracts::GET_ASSET_TOTALS, &[key])?;
    let supply = sandbox::stack_int(&stack, 0)?;
    let borrow = sandbox::stack_int(&stack, 1)?;

    Ok((
        ReserveEntry(scaled(reserve, asset.digits), asset.name.clone()),
        TotalsEntry(
            scaled(supply, asset.digits),
            scaled(borrow, asset.digits),
            asset.name.clone(),
        ),
    ))
}

/// Midnight UTC of `day`, unix seconds.
fn day_start_unix(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Fixed-point display value: raw / 10^digits.
fn scaled(raw: U256, digits: u32) -> f64 {
    u256_to_f64(raw) / 10f64.powi(digits as i32)
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .into_limbs()
        .iter()
        .rev()
        .fold(0f64, |acc, &limb| acc * 2f64.powi(64) + limb as f64)
}

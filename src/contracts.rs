//! Static registries for the two lending pool deployments.
//!
//! Asset keys are the 256-bit identifiers under which the pool contract
//! indexes its per-asset records; `digits` is the asset's decimal precision.
//! Registry order is significant: output entries are emitted in this order.

use alloy_primitives::b256;

use crate::types::{Asset, Pool};

/// Pool contract addresses, friendly form
pub const MAIN_POOL_ADDRESS: &str = "EQC8rUZqR_pWV1BylWUlPNBzyiTYVoBEmQkMIQDZXICfnuRr";
pub const LP_POOL_ADDRESS: &str = "EQBIlZX2URWkXCSg3QF2MJZU-wC5XkBoLww-hdWk2G37Jc6N";

/// Getter returning one integer: the asset's available reserve
pub const GET_ASSET_RESERVES: &str = "getAssetReserves";
/// Getter returning two integers: total supply, then total borrow
pub const GET_ASSET_TOTALS: &str = "getAssetTotals";

pub fn pool_address(pool: Pool) -> &'static str {
    match pool {
        Pool::Main => MAIN_POOL_ADDRESS,
        Pool::Lp => LP_POOL_ADDRESS,
    }
}

pub fn pool_assets(pool: Pool) -> Vec<Asset> {
    match pool {
        Pool::Main => main_pool_assets(),
        Pool::Lp => lp_pool_assets(),
    }
}

pub fn main_pool_assets() -> Vec<Asset> {
    vec![
        Asset::new(
            "TON",
            "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c",
            b256!("0x1a4219fe5e60d63af2a3cc7dce6fec69b45c6b5718497a6148e7c232ac87bd8a"),
            9,
        ),
        Asset::new(
            "stTON",
            "EQDNhy-nxYFgUqzfUzImBEP67JqsyMIcyk2S5_RwNNEYku0k",
            b256!("0x495668e908644f30322b997de8faaafc21f05aa52f8982f042dac1fe0b4d09d0"),
            9,
        ),
        Asset::new(
            "jUSDT",
            "EQB-MPwrd1G6WKNkLz_VnV6WqBDd142KMQv-g1O-8QUA3728",
            b256!("0xb387968236197958ca4ac55e9b5be38e688c7631af84c86756431f49a878ef33"),
            6,
        ),
        Asset::new(
            "jUSDC",
            "EQBynBO23ywHy_CgarY9NK9FTz0yDsG82PtcbSTQgGoXwiuA",
            b256!("0x83d916c68510802104d1f75aa6ce30eb1e477aede0d380eee2188e0e56581fc6"),
            6,
        ),
        Asset::new(
            "tsTON",
            "EQC98_qAmNEptUtPc7W6xdHh_ZHrBUFpw5Ft_IzNU20QAJav",
            b256!("0x3313e2f57ba870af34480350c789b0987d15b43a53172bfce294de21e7d724e7"),
            9,
        ),
        Asset::new(
            "USDt",
            "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs",
            b256!("0xca9006bd3fb03d355daeeff93b24be90afaa6e3ca0073ff5720f8a852c933278"),
            6,
        ),
    ]
}

pub fn lp_pool_assets() -> Vec<Asset> {
    vec![
        Asset::new(
            "TON",
            "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c",
            b256!("0x1a4219fe5e60d63af2a3cc7dce6fec69b45c6b5718497a6148e7c232ac87bd8a"),
            9,
        ),
        Asset::new(
            "USDt",
            "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs",
            b256!("0xca9006bd3fb03d355daeeff93b24be90afaa6e3ca0073ff5720f8a852c933278"),
            6,
        ),
        Asset::new(
            "USDT_STORM",
            "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs",
            b256!("0x6bfa124cc1343d14ba57ded299f6f514f5f26777099e3c378922ce4081ecbf91"),
            9,
        ),
        Asset::new(
            "TON_STORM",
            "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs",
            b256!("0x9c77a4d798a8f500dcfb877a07227c4ca9d6782504cdc7ce2ad0051e5641c032"),
            9,
        ),
        Asset::new(
            "TONUSDT_DEDUST",
            "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs",
            b256!("0xe025e6a575f174da6d62577c1fe204ccaa5d1e47c55c6b20c67daee56c357b60"),
            9,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContractAddress;
    use std::collections::HashSet;

    #[test]
    fn test_pool_addresses_parse() {
        for pool in [Pool::Main, Pool::Lp] {
            let addr = ContractAddress::parse_friendly(pool_address(pool)).unwrap();
            assert_eq!(addr.workchain, 0);
        }
    }

    #[test]
    fn test_registry_keys_unique() {
        for pool in [Pool::Main, Pool::Lp] {
            let assets = pool_assets(pool);
            let keys: HashSet<_> = assets.iter().map(|a| a.key).collect();
            assert_eq!(keys.len(), assets.len(), "duplicate key in {} registry", pool.as_str());
        }
    }

    #[test]
    fn test_main_registry_order() {
        let names: Vec<_> = main_pool_assets().into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["TON", "stTON", "jUSDT", "jUSDC", "tsTON", "USDt"]);
    }
}

use capsuleer_core::{RegionId, TypeId, ids::THE_FORGE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    EsiError, EsiResult,
    cache::{PRICE_CACHE_NAMESPACE, PRICE_CACHE_TTL, PriceCache, price_cache_key},
    query::{EsiQuery, QueryRequest},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSpread {
    pub type_id: TypeId,
    pub region_id: RegionId,
    pub lowest_sell: Option<f64>,
    pub highest_buy: Option<f64>,
    pub spread: Option<f64>,
    pub sell_order_count: usize,
    pub buy_order_count: usize,
}

impl MarketSpread {
    pub fn from_orders(type_id: TypeId, region_id: RegionId, sells: &[Value], buys: &[Value]) -> Self {
        let lowest_sell = order_prices(sells).reduce(f64::min);
        let highest_buy = order_prices(buys).reduce(f64::max);
        let spread = match (lowest_sell, highest_buy) {
            (Some(sell), Some(buy)) => Some(((sell - buy) * 100.0).round() / 100.0),
            _ => None,
        };

        Self {
            type_id,
            region_id,
            lowest_sell,
            highest_buy,
            spread,
            sell_order_count: sells.len(),
            buy_order_count: buys.len(),
        }
    }
}

fn order_prices(orders: &[Value]) -> impl Iterator<Item = f64> + '_ {
    orders
        .iter()
        .filter_map(|order| order.get("price").and_then(Value::as_f64))
}

/// Adjusted and average prices for every market type.
pub async fn market_prices<Q>(esi: &Q) -> EsiResult<Vec<Value>>
where
    Q: EsiQuery + ?Sized,
{
    const ENDPOINT: &str = "/markets/prices/";
    match esi.fetch_one(&QueryRequest::get(ENDPOINT)).await? {
        Value::Array(prices) => Ok(prices),
        other => Err(EsiError::UnexpectedBody {
            endpoint: ENDPOINT.to_owned(),
            detail: format!("expected an array of prices, got {other}"),
        }),
    }
}

pub async fn market_spread<Q>(
    esi: &Q,
    cache: Option<&dyn PriceCache>,
    type_id: TypeId,
) -> EsiResult<MarketSpread>
where
    Q: EsiQuery + ?Sized,
{
    let key = price_cache_key(PRICE_CACHE_NAMESPACE, type_id);
    if let Some(cache) = cache {
        match cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_value::<MarketSpread>(cached) {
                Ok(spread) => {
                    log::debug!("price cache hit for {key}");
                    return Ok(spread);
                }
                Err(err) => log::warn!("ignoring undecodable price cache entry {key}: {err}"),
            },
            Ok(None) => log::debug!("price cache miss for {key}"),
            Err(err) => log::warn!("price cache read failed for {key}: {err}"),
        }
    }

    let orders = |order_type: &'static str| {
        QueryRequest::get(format!("/markets/{THE_FORGE}/orders/"))
            .param("type_id", type_id)
            .param("order_type", order_type)
            .paginated()
    };
    let sells = esi.fetch_all(&orders("sell")).await?;
    let buys = esi.fetch_all(&orders("buy")).await?;
    let spread = MarketSpread::from_orders(type_id, THE_FORGE, &sells, &buys);

    if let Some(cache) = cache {
        let stored = match serde_json::to_value(&spread) {
            Ok(value) => cache.set(&key, &value, PRICE_CACHE_TTL).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = stored {
            log::warn!("price cache write failed for {key}: {err}");
        }
    }

    Ok(spread)
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use capsuleer_core::{TypeId, ids::THE_FORGE};
    use serde_json::{Value, json};

    use super::{MarketSpread, market_prices, market_spread};
    use crate::{
        EsiError,
        cache::{CacheError, MemoryPriceCache, PriceCache},
        errors::ApiResult,
        query::{EsiQuery, QueryRequest},
    };

    #[derive(Default)]
    struct OrderBookEsi {
        calls: Mutex<Vec<QueryRequest>>,
    }

    impl OrderBookEsi {
        fn calls(&self) -> usize {
            self.calls.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl EsiQuery for OrderBookEsi {
        async fn fetch_one(&self, request: &QueryRequest) -> ApiResult<Value> {
            self.calls.lock().expect("lock").push(request.clone());
            Ok(json!([{"type_id": 34, "average_price": 5.1, "adjusted_price": 5.0}]))
        }

        async fn fetch_all(&self, request: &QueryRequest) -> ApiResult<Vec<Value>> {
            self.calls.lock().expect("lock").push(request.clone());
            assert_eq!(request.endpoint, "/markets/10000002/orders/");
            let sell = request
                .params
                .iter()
                .any(|(key, value)| key == "order_type" && value == "sell");
            if sell {
                Ok(vec![json!({"price": 5.55}), json!({"price": 5.25}), json!({"price": 6})])
            } else {
                Ok(vec![json!({"price": 4.9}), json!({"price": 5.01})])
            }
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl PriceCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn empty_side_has_no_spread() {
        let spread = MarketSpread::from_orders(TypeId(34), THE_FORGE, &[json!({"price": 5.0})], &[]);
        assert_eq!(spread.lowest_sell, Some(5.0));
        assert_eq!(spread.highest_buy, None);
        assert_eq!(spread.spread, None);
        assert_eq!(spread.buy_order_count, 0);
    }

    #[tokio::test]
    async fn spread_is_lowest_sell_minus_highest_buy() {
        let esi = OrderBookEsi::default();

        let spread = market_spread(&esi, None, TypeId(34)).await.expect("spread");

        assert_eq!(spread.lowest_sell, Some(5.25));
        assert_eq!(spread.highest_buy, Some(5.01));
        assert_eq!(spread.spread, Some(0.24));
        assert_eq!(spread.sell_order_count, 3);
        assert_eq!(spread.region_id, THE_FORGE);
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let esi = OrderBookEsi::default();
        let cache = MemoryPriceCache::new();

        let first = market_spread(&esi, Some(&cache), TypeId(34)).await.expect("live");
        let second = market_spread(&esi, Some(&cache), TypeId(34)).await.expect("cached");

        assert_eq!(first, second);
        assert_eq!(esi.calls(), 2);
        assert!(
            cache
                .get("capsuleer:price:34")
                .await
                .expect("get")
                .is_some()
        );
    }

    #[tokio::test]
    async fn broken_cache_falls_through_to_live_fetch() {
        let esi = OrderBookEsi::default();

        let spread = market_spread(&esi, Some(&BrokenCache), TypeId(34))
            .await
            .expect("live despite cache");

        assert_eq!(spread.spread, Some(0.24));
        assert_eq!(esi.calls(), 2);
    }

    #[tokio::test]
    async fn prices_come_back_as_records() {
        let prices = market_prices(&OrderBookEsi::default()).await.expect("prices");
        assert_eq!(prices.len(), 1);
    }

    struct ObjectPricesEsi;

    #[async_trait]
    impl EsiQuery for ObjectPricesEsi {
        async fn fetch_one(&self, _request: &QueryRequest) -> ApiResult<Value> {
            Ok(json!({"error": "maintenance"}))
        }

        async fn fetch_all(&self, _request: &QueryRequest) -> ApiResult<Vec<Value>> {
            panic!("prices are not paginated");
        }
    }

    #[tokio::test]
    async fn non_array_prices_body_is_an_error() {
        let err = market_prices(&ObjectPricesEsi)
            .await
            .expect_err("object body must not pass as an empty list");

        let EsiError::UnexpectedBody { endpoint, detail } = &err else {
            panic!("expected unexpected-body error, got {err:?}");
        };
        assert_eq!(endpoint, "/markets/prices/");
        assert!(detail.contains("maintenance"));
    }
}

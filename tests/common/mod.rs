//! Synthetic index option market shared by the integration tests.
//!
//! Prices are Black-Scholes at a flat 2% rate on a smile whose log implied
//! vol is an exact quadratic in moneyness, so a clean market passes every
//! filter untouched.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use optfilter::{BlackScholes, OptionQuote, OptionType, QuoteRecord, RawQuote};

pub const RATE: f64 = 0.02;

/// Five trading days straddling a month end.
pub fn dates() -> Vec<NaiveDate> {
    [(2, 27), (2, 28), (2, 29), (3, 1), (3, 4)]
        .iter()
        .map(|&(m, d)| NaiveDate::from_ymd_opt(2024, m, d).unwrap())
        .collect()
}

pub fn spots() -> Vec<f64> {
    vec![100.0, 101.0, 99.5, 100.5, 102.0]
}

/// Expirations fixed on the first date, 30, 60 and 90 days out.
pub fn expirations() -> Vec<NaiveDate> {
    let first = dates()[0];
    [30, 60, 90].iter().map(|d| first + Duration::days(*d)).collect()
}

pub fn smile_iv(moneyness: f64) -> f64 {
    let d = moneyness - 1.0;
    (0.2f64.ln() + 0.8 * d * d - 0.3 * d).exp()
}

fn decimal(v: f64) -> Decimal {
    Decimal::from_f64_retain(v).unwrap()
}

/// Quote with a 1% bid-ask spread around the model price.
pub fn market_quote(
    date: NaiveDate,
    spot: f64,
    option_type: OptionType,
    strike: f64,
    expiration: NaiveDate,
) -> OptionQuote {
    let iv = smile_iv(strike / spot);
    let t = (expiration - date).num_days() as f64 / 365.0;
    let price = BlackScholes::new(RATE).price(spot, strike, t, iv, option_type);
    quote_with(date, spot, option_type, strike, expiration, price * 0.995, price * 1.005, iv)
}

#[allow(clippy::too_many_arguments)]
pub fn quote_with(
    date: NaiveDate,
    spot: f64,
    option_type: OptionType,
    strike: f64,
    expiration: NaiveDate,
    bid: f64,
    ask: f64,
    iv: f64,
) -> OptionQuote {
    OptionQuote::new(RawQuote {
        trade_date: date,
        option_type,
        strike: decimal(strike),
        expiration,
        bid: decimal(bid),
        ask: decimal(ask),
        implied_vol: Some(iv).filter(|v| v.is_finite()),
        underlying_level: decimal(spot),
        volume: 100,
    })
}

/// Calls and puts, strikes 86 to 116, three expirations, five dates.
pub fn clean_market() -> Vec<OptionQuote> {
    let mut quotes = Vec::new();
    for (date, spot) in dates().into_iter().zip(spots()) {
        for expiration in expirations() {
            for k in 86..=116 {
                for option_type in [OptionType::Call, OptionType::Put] {
                    quotes.push(market_quote(date, spot, option_type, k as f64, expiration));
                }
            }
        }
    }
    quotes
}

/// The clean market plus one instance of every defect the filters target,
/// all on the first date.
pub fn noisy_market() -> Vec<OptionQuote> {
    let date = dates()[0];
    let spot = spots()[0];
    let [e30, e60, _] = <[NaiveDate; 3]>::try_from(expirations()).unwrap();

    let mut quotes: Vec<OptionQuote> = clean_market()
        .into_iter()
        .map(|q| {
            let strike = q.strike();
            let on_first = q.trade_date() == date;
            let raw = q.raw().clone();

            // Smile outlier: implied vol 50% too high, price unchanged.
            if on_first && q.option_type() == OptionType::Call && strike == 103.0 && q.expiration() == e60 {
                return OptionQuote::new(RawQuote {
                    implied_vol: raw.implied_vol.map(|iv| iv * 1.5),
                    ..raw
                });
            }
            // Parity outlier: put 3 points rich.
            if on_first && q.option_type() == OptionType::Put && strike == 110.0 && q.expiration() == e30 {
                return OptionQuote::new(RawQuote {
                    bid: raw.bid + Decimal::from(3),
                    ask: raw.ask + Decimal::from(3),
                    ..raw
                });
            }
            q
        })
        .collect();

    // Exact duplicate.
    quotes.push(market_quote(date, spot, OptionType::Call, 100.0, e30));
    // Same contract at another price, off the smile.
    let fair = market_quote(date, spot, OptionType::Call, 101.0, e30);
    quotes.push(quote_with(
        date,
        spot,
        OptionType::Call,
        101.0,
        e30,
        fair.derived.mid_price + 0.5,
        fair.derived.mid_price + 0.7,
        0.6,
    ));
    // Zero bid.
    quotes.push(quote_with(date, spot, OptionType::Call, 117.0, e30, 0.0, 0.05, 0.21));
    // Maturity out of bounds.
    quotes.push(market_quote(date, spot, OptionType::Call, 100.0, date + Duration::days(5)));
    quotes.push(market_quote(date, spot, OptionType::Call, 100.0, date + Duration::days(200)));
    // Implied vol out of bounds.
    quotes.push(quote_with(date, spot, OptionType::Put, 100.0, date + Duration::days(45), 15.0, 15.5, 1.5));
    quotes.push(quote_with(date, spot, OptionType::Put, 100.0, date + Duration::days(46), 0.5, 0.6, 0.03));
    // Moneyness out of bounds.
    quotes.push(market_quote(date, spot, OptionType::Put, 70.0, e30));

    quotes
}

/// Feed rows for a quote set, as the loader would produce them.
pub fn records(quotes: &[OptionQuote]) -> Vec<QuoteRecord> {
    quotes
        .iter()
        .map(|q| {
            let raw = q.raw();
            QuoteRecord {
                date: Some(raw.trade_date),
                option_type: Some(raw.option_type.as_str().to_string()),
                strike: Some(q.strike()),
                expiration: Some(raw.expiration),
                days_to_maturity: None,
                bid: Some(raw.bid.try_into().unwrap()),
                ask: Some(raw.ask.try_into().unwrap()),
                implied_vol: raw.implied_vol,
                underlying_level: Some(q.spot()),
                volume: Some(raw.volume),
            }
        })
        .collect()
}

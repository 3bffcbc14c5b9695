//! Fixture record served by `/fetch/demo` when the provider quota is spent.
//!
//! Same top-level layout and provider-shaped payloads as a live record;
//! only the content is canned.

use chrono::{DateTime, Timelike, Utc};
use market_core::AggregateResult;
use serde_json::{json, Value};

const DAILY_BARS: [(&str, &str, &str, &str, &str, &str); 5] = [
    ("2024-01-15", "148.50", "152.00", "147.25", "151.25", "25000000"),
    ("2024-01-14", "145.00", "149.50", "144.75", "148.50", "22000000"),
    ("2024-01-13", "142.00", "146.00", "141.50", "145.00", "28000000"),
    ("2024-01-12", "140.25", "143.75", "139.50", "142.00", "30000000"),
    ("2024-01-11", "138.00", "141.50", "137.25", "140.25", "26000000"),
];

/// Build the fixture for an already-normalized ticker at time `now`.
pub fn demo_record(ticker: &str, now: DateTime<Utc>) -> AggregateResult {
    AggregateResult::new(
        ticker,
        demo_intraday(ticker, now),
        demo_daily(ticker, now),
        demo_news(ticker),
    )
}

fn demo_intraday(ticker: &str, now: DateTime<Utc>) -> Value {
    // Bars land on 5-minute boundaries.
    let bar_time = format!(
        "{} {:02}:{:02}:00",
        now.format("%Y-%m-%d"),
        now.hour(),
        now.minute() - now.minute() % 5
    );

    json!({
        "Meta Data": {
            "1. Information": "Intraday (5min) open, high, low, close prices and volume",
            "2. Symbol": ticker,
            "3. Last Refreshed": now.format("%Y-%m-%d %H:%M:%S").to_string(),
            "4. Interval": "5min",
        },
        "Time Series (5min)": {
            bar_time: {
                "1. open": "150.00",
                "2. high": "152.50",
                "3. low": "149.75",
                "4. close": "151.25",
                "5. volume": "1000000",
            }
        }
    })
}

fn demo_daily(ticker: &str, now: DateTime<Utc>) -> Value {
    let series: serde_json::Map<String, Value> = DAILY_BARS
        .iter()
        .map(|(date, open, high, low, close, volume)| {
            (
                date.to_string(),
                json!({
                    "1. open": open,
                    "2. high": high,
                    "3. low": low,
                    "4. close": close,
                    "5. volume": volume,
                }),
            )
        })
        .collect();

    json!({
        "Meta Data": {
            "1. Information": "Daily Prices (open, high, low, close) and Volumes",
            "2. Symbol": ticker,
            "3. Last Refreshed": now.format("%Y-%m-%d").to_string(),
        },
        "Time Series (Daily)": series,
    })
}

fn demo_news(ticker: &str) -> Value {
    json!({
        "items": "1",
        "sentiment_score_definition": "x <= -0.35: Bearish; -0.35 < x <= -0.15: Somewhat-Bearish; -0.15 < x < 0.15: Neutral; 0.15 <= x < 0.35: Somewhat_Bullish; x >= 0.35: Bullish",
        "relevance_score_definition": "0 < x <= 1, with a higher score indicating higher relevance.",
        "feed": [
            {
                "title": format!("{} Demo News: Strong Performance Expected", ticker),
                "summary": "Demo news article for testing purposes.",
                "overall_sentiment_score": 0.25,
                "overall_sentiment_label": "Somewhat-Bullish",
            }
        ]
    })
}

//! Human-readable rendering of server replies.
use market_common::records::{NewsEvent, StockView};
use market_common::{MarketEvent, Request};

/// Render one reply line received for `request`.
pub fn render_line(request: Request, line: &str) -> String {
    let line = line.trim();
    let rendered = match request {
        Request::Subscribe => serde_json::from_str::<MarketEvent>(line).ok().map(|event| match event {
            MarketEvent::UpdateStock(stocks) => format!("UPDATE {}", format_stocks(&stocks)),
            MarketEvent::NewStockEvent(marker) => format!("NEWS {marker}"),
        }),
        Request::Stock => serde_json::from_str::<Vec<StockView>>(line)
            .ok()
            .map(|stocks| format!("STOCKS {}", format_stocks(&stocks))),
        Request::RandomNews if line == "{}" => Some("No news available".to_string()),
        Request::RandomNews => serde_json::from_str::<NewsEvent>(line).ok().map(|news| {
            format!(
                "NEWS #{} stock={} {:+}% {}",
                news.news_id, news.stock_id, news.value_fluctuation, news.description
            )
        }),
    };
    rendered.unwrap_or_else(|| format!("Received non-JSON message: {line}"))
}

fn format_stocks(stocks: &[StockView]) -> String {
    stocks
        .iter()
        .map(|s| format!("{}={}", s.name, s.price))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_feed_events() {
        let update = r#"{"event":"update_stock","data":[{"name":"BBCA","price":9100},{"name":"TLKM","price":3200}]}"#;
        assert_eq!(render_line(Request::Subscribe, update), "UPDATE BBCA=9100 TLKM=3200");
        let news = r#"{"event":"new_stock_event","data":"Rate cut"}"#;
        assert_eq!(render_line(Request::Subscribe, news), "NEWS Rate cut");
    }

    #[test]
    fn renders_one_shot_replies() {
        assert_eq!(
            render_line(Request::Stock, "[{\"name\":\"ASII\",\"price\":5000}]\n"),
            "STOCKS ASII=5000"
        );
        assert_eq!(render_line(Request::RandomNews, "{}\n"), "No news available");
        let news = r#"{"news_id":3,"stock_id":1,"description":"Strike","value_fluctuation":-4.5}"#;
        assert_eq!(
            render_line(Request::RandomNews, news),
            "NEWS #3 stock=1 -4.5% Strike"
        );
    }

    #[test]
    fn falls_back_to_raw_line() {
        assert_eq!(
            render_line(Request::Stock, "garbage"),
            "Received non-JSON message: garbage"
        );
    }
}

//! Events pushed from the server to subscribed clients.
//!
//! Every event travels as one JSON object per line:
//! `{"event": "update_stock", "data": [{"name": "BBCA", "price": 9100}]}`.
//! The event names are part of the wire contract and must not change.
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::Result;
use crate::records::StockView;

/// Event broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarketEvent {
    /// Full ordered snapshot of all tracked stocks.
    UpdateStock(Vec<StockView>),
    /// Free-text marker announcing that a news item started moving a stock.
    NewStockEvent(String),
}

impl MarketEvent {
    /// Wire name of the event (`update_stock` or `new_stock_event`).
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Encode the event as a single newline-terminated JSON line.
    pub fn to_json_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_stock_uses_wire_name() {
        let event = MarketEvent::UpdateStock(vec![StockView {
            name: "TLKM".into(),
            price: 3200,
        }]);
        assert_eq!(event.name(), "update_stock");
        let line = String::from_utf8(event.to_json_line().unwrap()).unwrap();
        assert_eq!(
            line,
            "{\"event\":\"update_stock\",\"data\":[{\"name\":\"TLKM\",\"price\":3200}]}\n"
        );
    }

    #[test]
    fn new_stock_event_carries_marker() {
        let event = MarketEvent::NewStockEvent("Merger rumours".into());
        assert_eq!(event.name(), "new_stock_event");
        let decoded: MarketEvent =
            serde_json::from_str(r#"{"event":"new_stock_event","data":"Merger rumours"}"#).unwrap();
        assert_eq!(decoded, event);
    }
}

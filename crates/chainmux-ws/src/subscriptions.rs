//! Address subscription registry.
//!
//! Tracks which addresses are subscribed and where their events go, and
//! supplies the address list for re-subscribing after a reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use chainmux_core::{AddressEvent, EventSink};

/// Live address subscriptions for one socket.
#[derive(Clone, Default)]
pub struct AddressBook {
    entries: Arc<Mutex<HashMap<String, EventSink>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink for `address`, replacing any previous one.
    pub fn insert(&self, address: impl Into<String>, sink: EventSink) {
        self.entries.lock().unwrap().insert(address.into(), sink);
    }

    /// Drops the registration. Returns whether it existed.
    pub fn remove(&self, address: &str) -> bool {
        self.entries.lock().unwrap().remove(address).is_some()
    }

    /// Addresses to put on the wire, used on subscribe and after every
    /// reconnect.
    pub fn addresses(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    /// Forwards one notification to the matching sink.
    ///
    /// The sink runs outside the registry lock so it may re-enter the
    /// book, e.g. to unsubscribe itself. Returns whether a sink took
    /// the event.
    pub fn dispatch(&self, endpoint: &str, data: &Value) -> bool {
        let Some(address) = data.get("address").and_then(Value::as_str) else {
            return false;
        };
        let sink = self.entries.lock().unwrap().get(address).cloned();
        match sink {
            Some(sink) => {
                sink(AddressEvent {
                    address: address.to_string(),
                    endpoint: endpoint.to_string(),
                    payload: data.clone(),
                });
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn insert_and_dispatch() {
        let book = AddressBook::new();
        let (tx, rx) = mpsc::channel();
        book.insert(
            "0xabc",
            Arc::new(move |event: AddressEvent| {
                tx.send(event).unwrap();
            }),
        );

        let taken = book.dispatch("wss://bb.example", &json!({ "address": "0xabc", "tx": {} }));
        assert!(taken);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.address, "0xabc");
        assert_eq!(event.endpoint, "wss://bb.example");
        assert_eq!(event.payload["address"], "0xabc");
    }

    #[test]
    fn unknown_address_is_not_dispatched() {
        let book = AddressBook::new();
        book.insert("0xabc", Arc::new(|_event| {}));
        assert!(!book.dispatch("wss://bb.example", &json!({ "address": "0xdef" })));
        assert!(!book.dispatch("wss://bb.example", &json!({ "subscribed": true })));
    }

    #[test]
    fn sink_may_unsubscribe_itself() {
        let book = AddressBook::new();
        let reentrant = book.clone();
        book.insert(
            "0xabc",
            Arc::new(move |event: AddressEvent| {
                reentrant.remove(&event.address);
            }),
        );

        assert!(book.dispatch("wss://bb.example", &json!({ "address": "0xabc" })));
        assert!(book.is_empty());
        assert!(!book.dispatch("wss://bb.example", &json!({ "address": "0xabc" })));
    }

    #[test]
    fn addresses_for_resubscribe() {
        let book = AddressBook::new();
        book.insert("0xa", Arc::new(|_event| {}));
        book.insert("0xb", Arc::new(|_event| {}));

        let mut addresses = book.addresses();
        addresses.sort_unstable();
        assert_eq!(addresses, ["0xa", "0xb"]);
        assert_eq!(book.len(), 2);
    }
}

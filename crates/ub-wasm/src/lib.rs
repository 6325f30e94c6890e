//! WebAssembly bindings for UserBlocker
//!
//! Exposes the message surface to a browser extension host. The store lives
//! in a thread-local because wasm in an extension page is single-threaded
//! and the store is intentionally `!Sync`.

use std::cell::RefCell;

use wasm_bindgen::prelude::*;

use ub_store::service::{dispatch as service_dispatch, Request};
use ub_store::{MemoryBackend, PatternStore};

thread_local! {
    static STORE: RefCell<Option<PatternStore<MemoryBackend>>> = const { RefCell::new(None) };
}

#[wasm_bindgen]
pub fn init() -> Result<(), JsValue> {
    STORE.with(|store| {
        let mut store = store.borrow_mut();
        if store.is_some() {
            return Err(JsValue::from_str(
                "Already initialized. Reload the page to reinitialize.",
            ));
        }
        *store = Some(PatternStore::new(MemoryBackend::new()));
        Ok(())
    })
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    STORE.with(|store| store.borrow().is_some())
}

/// Execute one message-surface command. Input and output are JSON strings;
/// an unusable request degrades to a failure outcome, never an exception.
#[wasm_bindgen]
pub fn dispatch(request_json: &str) -> String {
    let request: Request = match serde_json::from_str(request_json) {
        Ok(request) => request,
        Err(err) => {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "unusable request payload: {err}"
            )));
            return failure_json("Malformed request");
        }
    };

    STORE.with(|store| {
        let mut store = store.borrow_mut();
        let store = match store.as_mut() {
            Some(store) => store,
            None => return failure_json("Not initialized"),
        };
        let response = service_dispatch(store, request);
        serde_json::to_string(&response).unwrap_or_else(|_| failure_json("Serialization failure"))
    })
}

/// Convenience entry point for the content script's hot path.
#[wasm_bindgen]
pub fn check_match(identifier: &str) -> JsValue {
    let response = dispatch(&format!(
        r#"{{"action":"checkMatch","identifier":{}}}"#,
        serde_json::Value::String(identifier.to_string())
    ));

    let result = js_sys::Object::new();
    match serde_json::from_str::<serde_json::Value>(&response) {
        Ok(value) => {
            let matched = value["matched"].as_bool().unwrap_or(false);
            let _ = js_sys::Reflect::set(&result, &"matched".into(), &JsValue::from(matched));
            if let Some(pattern) = value["pattern"].as_str() {
                let _ = js_sys::Reflect::set(&result, &"pattern".into(), &JsValue::from_str(pattern));
            }
        }
        Err(_) => {
            let _ = js_sys::Reflect::set(&result, &"matched".into(), &JsValue::from(false));
        }
    }
    result.into()
}

#[wasm_bindgen]
pub fn get_store_info() -> JsValue {
    let result = js_sys::Object::new();
    STORE.with(|store| {
        let mut store = store.borrow_mut();
        match store.as_mut() {
            Some(store) => {
                let total = store.total_count().unwrap_or(0);
                let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(true));
                let _ = js_sys::Reflect::set(&result, &"totalCount".into(), &JsValue::from(total as u32));
            }
            None => {
                let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(false));
            }
        }
    });
    result.into()
}

fn failure_json(reason: &str) -> String {
    format!(r#"{{"success":false,"reason":"{reason}","totalCount":0}}"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_json_round_trip() {
        init().ok();

        let response = dispatch(r#"{"action":"add","pattern":"troll*"}"#);
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["totalCount"], 1);

        let response = dispatch(r#"{"action":"checkMatch","identifier":"trollmaster"}"#);
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["matched"], true);
        assert_eq!(value["pattern"], "troll*");
    }
}

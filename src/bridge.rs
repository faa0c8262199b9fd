/// Browser-side adapters over the extension APIs in js/bridge.js
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::api::{AnthropicClient, ReqwestTransport};
use crate::clock::BrowserClock;
use crate::config::{ExtensionConfig, CONFIG_KEY};
use crate::coordinator::{Coordinator, PageChannel};
use crate::error::{ChannelError, StorageError};
use crate::messages::{ContentRequest, ContentResponse};
use crate::storage::StorageBackend;
use crate::store::TabStateStore;

#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeStorage(key: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getActiveTab() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryOpenTabIds() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendTabMessage(tab_id: i32, message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    fn downloadText(filename: &str, mime_type: &str, content: &str) -> Result<(), JsValue>;
}

/// Serialize for JS; maps become plain objects so chrome.storage can hold them
pub fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

pub fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| e.to_string())
}

/// Best-effort text of a thrown JS value
pub fn js_error_message(error: &JsValue) -> String {
    if let Some(text) = error.as_string() {
        return text;
    }
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", error)
}

/// chrome.storage.local
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStorage;

impl StorageBackend for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let value = getStorage(key)
            .await
            .map_err(|e| StorageError::Unavailable(js_error_message(&e)))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        from_js(value).map(Some).map_err(StorageError::Serialization)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let value = to_js(&value).map_err(|e| StorageError::Serialization(js_error_message(&e)))?;
        setStorage(key, value).await.map_err(|e| {
            let message = js_error_message(&e);
            if message.to_uppercase().contains("QUOTA") {
                StorageError::QuotaExceeded(message)
            } else {
                StorageError::Unavailable(message)
            }
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        removeStorage(key)
            .await
            .map_err(|e| StorageError::Unavailable(js_error_message(&e)))
    }
}

/// chrome.tabs.sendMessage to the content script
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromePageChannel;

impl PageChannel for ChromePageChannel {
    async fn send(&self, tab_id: i32, request: &ContentRequest) -> Result<ContentResponse, ChannelError> {
        let message = to_js(request).map_err(|e| ChannelError::Malformed(js_error_message(&e)))?;
        let reply = sendTabMessage(tab_id, message)
            .await
            .map_err(|e| ChannelError::Unreachable(js_error_message(&e)))?;
        from_js(reply).map_err(ChannelError::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TabInfo {
    pub id: i32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

pub async fn get_active_tab() -> Result<TabInfo, String> {
    let tab = getActiveTab()
        .await
        .map_err(|e| format!("Failed to get active tab: {}", js_error_message(&e)))?;
    from_js(tab).map_err(|e| format!("Failed to parse tab: {}", e))
}

pub async fn open_tab_ids() -> Result<Vec<i32>, String> {
    let ids = queryOpenTabIds()
        .await
        .map_err(|e| format!("Failed to query tabs: {}", js_error_message(&e)))?;
    from_js(ids).map_err(|e| format!("Failed to parse tab ids: {}", e))
}

pub fn download(filename: &str, mime_type: &str, content: &str) -> Result<(), String> {
    downloadText(filename, mime_type, content)
        .map_err(|e| format!("Download failed: {}", js_error_message(&e)))
}

/// Stored overrides, or defaults
pub async fn load_config() -> ExtensionConfig {
    match ChromeStorage.get(CONFIG_KEY).await {
        Ok(value) => ExtensionConfig::from_stored(value),
        Err(e) => {
            log::warn!("Failed to read config, using defaults: {}", e);
            ExtensionConfig::default()
        }
    }
}

pub type BrowserCoordinator = Coordinator<ChromeStorage, BrowserClock, ReqwestTransport, ChromePageChannel>;

/// The coordinator wired to chrome.storage, fetch and tab messaging
pub async fn browser_coordinator() -> BrowserCoordinator {
    let config = load_config().await;
    let store = TabStateStore::new(ChromeStorage, BrowserClock, config.store);
    let client = AnthropicClient::new(ReqwestTransport::new(), BrowserClock, config.api.clone());
    let coordinator = Coordinator::new(store, client, ChromePageChannel, config.api);
    coordinator.load_credential().await;
    coordinator
}

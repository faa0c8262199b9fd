/// Service worker hooks: keep the store in step with tab lifecycle events
use std::collections::HashSet;

use wasm_bindgen::prelude::*;

use crate::bridge::{browser_coordinator, open_tab_ids};

/// chrome.tabs.onUpdated, once the tab has a URL
#[wasm_bindgen]
pub async fn on_tab_updated(tab_id: i32, url: String, title: String) {
    let coordinator = browser_coordinator().await;
    coordinator.observe_tab(tab_id, &url, &title).await;
}

/// chrome.tabs.onRemoved
#[wasm_bindgen]
pub async fn on_tab_removed(tab_id: i32) {
    let coordinator = browser_coordinator().await;
    coordinator.clear_tab(tab_id).await;
}

/// Periodic alarm and startup: drop entries for closed or very old tabs
#[wasm_bindgen]
pub async fn cleanup_stale_tabs() -> Result<u32, JsValue> {
    let open: HashSet<i32> = open_tab_ids()
        .await
        .map_err(|e| JsValue::from_str(&e))?
        .into_iter()
        .collect();

    let coordinator = browser_coordinator().await;
    let store = coordinator.store();
    let mut removed = store.cleanup_stale(&open).await;
    removed.extend(store.enforce_capacity().await);
    log::info!("Cleanup removed {} tab entries", removed.len());
    Ok(removed.len() as u32)
}

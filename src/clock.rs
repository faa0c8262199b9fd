/// Time source and sleep primitive shared by every bounded wait
#[cfg(test)]
use std::cell::{Cell, RefCell};
#[cfg(test)]
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// Wall clock in epoch milliseconds plus a cooperative sleep
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now_ms(&self) -> f64;

    async fn sleep(&self, ms: u32);
}

/// `Date.now()` and `setTimeout`, in either a page or a service worker
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    async fn sleep(&self, ms: u32) {
        let timeout = ms.min(i32::MAX as u32) as i32;
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let global = js_sys::global();
            let scheduled = if let Some(window) = global.dyn_ref::<web_sys::Window>() {
                window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
            } else if let Some(worker) = global.dyn_ref::<web_sys::WorkerGlobalScope>() {
                worker.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
            } else {
                Err(JsValue::NULL)
            };

            // No timer available: resolve now rather than hang
            if scheduled.is_err() {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// Deterministic clock: sleeping advances time instantly and is recorded
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
    sleeps: Rc<RefCell<Vec<u32>>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_ms: f64) -> ManualClock {
        ManualClock {
            now: Rc::new(Cell::new(start_ms)),
            sleeps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.borrow().clone()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    async fn sleep(&self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
        self.advance(ms as f64);
    }
}

/// Read/query view over a page document, plus simulated clicks
use wasm_bindgen::JsCast;

use crate::error::DomError;

pub trait PageNode: Sized {
    /// Rendered text of the node and its descendants
    fn text(&self) -> Result<String, DomError>;

    fn attribute(&self, name: &str) -> Option<String>;

    fn query_all(&self, selector: &str) -> Result<Vec<Self>, DomError>;

    /// Fire-and-forget click
    fn click(&self) -> Result<(), DomError>;
}

pub trait PageDocument {
    type Node: PageNode;

    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, DomError>;

    fn title(&self) -> String;

    fn url(&self) -> String;

    fn query_first(&self, selector: &str) -> Result<Option<Self::Node>, DomError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    /// Whether any of `selectors` matches; query errors count as no match
    fn matches_any(&self, selectors: &[&str]) -> bool {
        selectors
            .iter()
            .any(|s| self.query_all(s).is_ok_and(|nodes| !nodes.is_empty()))
    }
}

/// The live DOM through web-sys
pub struct WebDocument {
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> WebDocument {
        WebDocument { document }
    }

    /// The current window's document, if there is one
    pub fn current() -> Option<WebDocument> {
        web_sys::window()
            .and_then(|w| w.document())
            .map(WebDocument::new)
    }
}

#[derive(Clone)]
pub struct WebNode {
    element: web_sys::Element,
}

fn collect_elements(list: web_sys::NodeList) -> Vec<WebNode> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
        .map(|element| WebNode { element })
        .collect()
}

impl PageNode for WebNode {
    fn text(&self) -> Result<String, DomError> {
        if !self.element.is_connected() {
            return Err(DomError::Detached);
        }
        let text = match self.element.dyn_ref::<web_sys::HtmlElement>() {
            Some(html) => html.inner_text(),
            None => self.element.text_content().unwrap_or_default(),
        };
        Ok(text)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    fn query_all(&self, selector: &str) -> Result<Vec<WebNode>, DomError> {
        self.element
            .query_selector_all(selector)
            .map(collect_elements)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))
    }

    fn click(&self) -> Result<(), DomError> {
        if !self.element.is_connected() {
            return Err(DomError::Detached);
        }
        match self.element.dyn_ref::<web_sys::HtmlElement>() {
            Some(html) => {
                html.click();
                Ok(())
            }
            None => Err(DomError::Interaction(format!(
                "<{}> is not clickable",
                self.element.tag_name().to_lowercase()
            ))),
        }
    }
}

impl PageDocument for WebDocument {
    type Node = WebNode;

    fn query_all(&self, selector: &str) -> Result<Vec<WebNode>, DomError> {
        self.document
            .query_selector_all(selector)
            .map(collect_elements)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))
    }

    fn title(&self) -> String {
        self.document.title()
    }

    fn url(&self) -> String {
        self.document.url().unwrap_or_default()
    }
}

/// In-memory document keyed by exact selector strings
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::rc::Rc;

    type ClickHook = Rc<dyn Fn()>;

    #[derive(Clone, Default)]
    pub struct FakeNode {
        text: String,
        attributes: HashMap<String, String>,
        children: HashMap<String, Vec<FakeNode>>,
        on_click: Option<ClickHook>,
        detached: bool,
        clicks: Rc<RefCell<u32>>,
    }

    impl FakeNode {
        pub fn new(text: &str) -> FakeNode {
            FakeNode {
                text: text.to_string(),
                ..FakeNode::default()
            }
        }

        pub fn child(mut self, selector: &str, node: FakeNode) -> FakeNode {
            self.children.entry(selector.to_string()).or_default().push(node);
            self
        }

        pub fn attr(mut self, name: &str, value: &str) -> FakeNode {
            self.attributes.insert(name.to_string(), value.to_string());
            self
        }

        pub fn on_click(mut self, hook: impl Fn() + 'static) -> FakeNode {
            self.on_click = Some(Rc::new(hook));
            self
        }

        pub fn detached(mut self) -> FakeNode {
            self.detached = true;
            self
        }

        pub fn click_count(&self) -> u32 {
            *self.clicks.borrow()
        }
    }

    impl PageNode for FakeNode {
        fn text(&self) -> Result<String, DomError> {
            if self.detached {
                return Err(DomError::Detached);
            }
            Ok(self.text.clone())
        }

        fn attribute(&self, name: &str) -> Option<String> {
            self.attributes.get(name).cloned()
        }

        fn query_all(&self, selector: &str) -> Result<Vec<FakeNode>, DomError> {
            Ok(self.children.get(selector).cloned().unwrap_or_default())
        }

        fn click(&self) -> Result<(), DomError> {
            if self.detached {
                return Err(DomError::Detached);
            }
            *self.clicks.borrow_mut() += 1;
            if let Some(hook) = &self.on_click {
                hook();
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeDocument {
        nodes: Rc<RefCell<HashMap<String, Vec<FakeNode>>>>,
        failing: Rc<RefCell<HashSet<String>>>,
        queries: Rc<RefCell<Vec<String>>>,
        pub title: String,
        pub url: String,
    }

    impl FakeDocument {
        pub fn new() -> FakeDocument {
            FakeDocument::default()
        }

        pub fn insert(&self, selector: &str, node: FakeNode) {
            self.nodes
                .borrow_mut()
                .entry(selector.to_string())
                .or_default()
                .push(node);
        }

        pub fn fail(&self, selector: &str) {
            self.failing.borrow_mut().insert(selector.to_string());
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.borrow().clone()
        }
    }

    impl PageDocument for FakeDocument {
        type Node = FakeNode;

        fn query_all(&self, selector: &str) -> Result<Vec<FakeNode>, DomError> {
            self.queries.borrow_mut().push(selector.to_string());
            if self.failing.borrow().contains(selector) {
                return Err(DomError::Detached);
            }
            Ok(self.nodes.borrow().get(selector).cloned().unwrap_or_default())
        }

        fn title(&self) -> String {
            self.title.clone()
        }

        fn url(&self) -> String {
            self.url.clone()
        }
    }
}

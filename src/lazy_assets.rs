use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::OnceLock;

use futures::channel::oneshot;
use leptos::prelude::*;
use regex::Regex;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

// Globals installed by the lazily loaded scripts. `catch` turns a missing
// global into an Err instead of an uncaught exception.
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = Prism, js_name = highlightAllUnder, catch)]
    fn prism_highlight_all_under(root: &web_sys::Element) -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = Prism, js_name = highlightAll, catch)]
    fn prism_highlight_all() -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = MathJax, js_name = typeset, catch)]
    fn mathjax_typeset(elements: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = mermaid, js_name = init, catch)]
    fn mermaid_init(config: &JsValue, nodes: &web_sys::NodeList) -> Result<(), JsValue>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Library {
    Prism,
    MathJax,
    Mermaid,
}

impl Library {
    pub fn name(self) -> &'static str {
        match self {
            Library::Prism => "prism",
            Library::MathJax => "mathjax",
            Library::Mermaid => "mermaid",
        }
    }

    /// Scripts in load order: the library itself plus its init shim. MathJax
    /// wants its configuration present before the library executes.
    fn sources(self) -> &'static [&'static str] {
        match self {
            Library::Prism => &[
                "/static/libs/prism-1.30.0/prism.min.js",
                "/static/js/prism-init.js",
            ],
            Library::MathJax => &[
                "/static/js/mathjax-init.js",
                "/static/libs/mathjax-3.2.2/tex-mml-chtml.js",
            ],
            Library::Mermaid => &[
                "/static/libs/mermaid-11.12.1/mermaid.min.js",
                "/static/js/mermaid-init.js",
            ],
        }
    }
}

/// Which libraries have finished loading, and which script tags exist.
/// `requested` mirrors the document's `script[src]` set so that two loads
/// racing on the same library never insert the same tag twice; there is
/// deliberately no in-flight promise cache beyond that.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadTracker {
    loaded: HashSet<Library>,
    requested: HashSet<&'static str>,
}

impl LoadTracker {
    pub fn is_loaded(&self, library: Library) -> bool {
        self.loaded.contains(&library)
    }

    pub fn mark_loaded(&mut self, library: Library) {
        self.loaded.insert(library);
    }

    /// Returns the scripts still to be inserted for `library`, claiming them
    /// in the same step. A second concurrent call gets an empty list.
    pub fn begin(&mut self, library: Library) -> Vec<&'static str> {
        if self.is_loaded(library) {
            return Vec::new();
        }
        library
            .sources()
            .iter()
            .copied()
            .filter(|src| self.requested.insert(src))
            .collect()
    }
}

pub fn sniff_code(html: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<pre[^>]*>\s*<code").unwrap());
    re.is_match(html)
}

pub fn sniff_math(html: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"class="[^"]*\b(math|katex)"#).unwrap());
    re.is_match(html) || html.contains('$') || html.contains("\\(") || html.contains("\\[")
}

pub fn sniff_mermaid(html: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"class="[^"]*\bmermaid"#).unwrap());
    re.is_match(html)
}

/// Loads heavy rendering libraries only when the page needs them; saves a
/// couple of megabytes on pages without code, math, or diagrams.
#[derive(Clone, Copy)]
pub struct Assets {
    tracker: RwSignal<LoadTracker>,
}

impl Assets {
    pub fn provide() -> Self {
        let assets = Self {
            tracker: RwSignal::new(LoadTracker::default()),
        };
        provide_context(assets);
        assets
    }

    /// Idempotent: loading an already-loaded library is a no-op, and scripts
    /// claimed by a concurrent call are not inserted again.
    pub async fn ensure(self, library: Library) {
        let pending = self
            .tracker
            .try_update(|tracker| tracker.begin(library))
            .unwrap_or_default();
        for src in pending {
            if let Err(err) = inject_script(src).await {
                leptos::logging::error!("failed to load {}: {err:?}", library.name());
                return;
            }
        }
        self.tracker.update(|tracker| tracker.mark_loaded(library));
    }

    /// Page-load sniff: inspects the live document and loads whatever the
    /// rendered content calls for.
    pub async fn init(self) {
        let doc = document();

        if doc.query_selector("pre code").ok().flatten().is_some() {
            self.ensure(Library::Prism).await;
            if let Err(err) = prism_highlight_all() {
                leptos::logging::warn!("prism highlight failed: {err:?}");
            }
        }

        let has_math_markers = doc
            .query_selector(".math, .katex, [class*=\"math\"], [class*=\"katex\"]")
            .ok()
            .flatten()
            .is_some();
        let has_math_text = doc
            .query_selector(".markdown-content")
            .ok()
            .flatten()
            .and_then(|el| el.text_content())
            .is_some_and(|text| {
                text.contains('$') || text.contains("\\(") || text.contains("\\[")
            });
        if has_math_markers || has_math_text {
            self.ensure(Library::MathJax).await;
            typeset_math_document();
        }

        if doc.query_selector(".mermaid").ok().flatten().is_some() {
            self.ensure(Library::Mermaid).await;
            if let Some(el) = doc.body() {
                render_diagrams_under(&el);
            }
        }
    }

    /// On-demand entry point for dynamically produced content, e.g. the
    /// editor preview.
    pub async fn force_load(self, library: Library) {
        self.ensure(library).await;
    }
}

/// Appends a deferred script tag to `<head>` and resolves once it loads.
/// A tag with the same `src` already in the document short-circuits.
async fn inject_script(src: &str) -> Result<(), JsValue> {
    let doc = document();
    if doc
        .query_selector(&format!("script[src=\"{src}\"]"))?
        .is_some()
    {
        return Ok(());
    }

    let script: web_sys::HtmlScriptElement = doc.create_element("script")?.unchecked_into();
    script.set_src(src);
    script.set_defer(true);

    let (tx, rx) = oneshot::channel::<bool>();
    let tx = Rc::new(RefCell::new(Some(tx)));

    let on_load = {
        let tx = Rc::clone(&tx);
        Closure::<dyn FnMut()>::new(move || {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send(true);
            }
        })
    };
    let on_error = {
        let tx = Rc::clone(&tx);
        Closure::<dyn FnMut()>::new(move || {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send(false);
            }
        })
    };
    script.set_onload(Some(on_load.as_ref().unchecked_ref()));
    script.set_onerror(Some(on_error.as_ref().unchecked_ref()));
    on_load.forget();
    on_error.forget();

    doc.head()
        .ok_or_else(|| JsValue::from_str("document has no head"))?
        .append_child(&script)?;

    match rx.await {
        Ok(true) => Ok(()),
        _ => Err(JsValue::from_str(&format!("script failed to load: {src}"))),
    }
}

pub fn highlight_code_under(root: &web_sys::Element) {
    if let Err(err) = prism_highlight_all_under(root) {
        leptos::logging::warn!("prism highlight failed: {err:?}");
    }
}

pub fn typeset_math_under(root: &web_sys::Element) {
    let elements = js_sys::Array::new();
    elements.push(root.as_ref());
    if let Err(err) = mathjax_typeset(&elements) {
        leptos::logging::warn!("mathjax typeset failed: {err:?}");
    }
}

fn typeset_math_document() {
    // MathJax processes the whole page when called without elements.
    if let Err(err) = mathjax_typeset(&JsValue::UNDEFINED) {
        leptos::logging::warn!("mathjax typeset failed: {err:?}");
    }
}

pub fn render_diagrams_under(root: &web_sys::Element) {
    match root.query_selector_all(".mermaid") {
        Ok(nodes) => {
            if nodes.length() > 0 {
                if let Err(err) = mermaid_init(&JsValue::UNDEFINED, &nodes) {
                    leptos::logging::warn!("mermaid render failed: {err:?}");
                }
            }
        }
        Err(err) => leptos::logging::warn!("mermaid query failed: {err:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_loads_never_claim_the_same_script_twice() {
        let mut tracker = LoadTracker::default();

        // Two triggers race before either load resolves.
        let first = tracker.begin(Library::Prism);
        let second = tracker.begin(Library::Prism);

        assert_eq!(
            first,
            vec![
                "/static/libs/prism-1.30.0/prism.min.js",
                "/static/js/prism-init.js",
            ],
        );
        assert!(second.is_empty());
    }

    #[test]
    fn loaded_library_is_a_noop() {
        let mut tracker = LoadTracker::default();
        tracker.begin(Library::Mermaid);
        tracker.mark_loaded(Library::Mermaid);
        assert!(tracker.is_loaded(Library::Mermaid));
        assert!(tracker.begin(Library::Mermaid).is_empty());
    }

    #[test]
    fn libraries_claim_independently() {
        let mut tracker = LoadTracker::default();
        assert_eq!(tracker.begin(Library::Prism).len(), 2);
        assert_eq!(tracker.begin(Library::MathJax).len(), 2);
    }

    #[test]
    fn sniffs_code_blocks() {
        assert!(sniff_code("<pre><code class=\"language-rust\">fn</code></pre>"));
        assert!(sniff_code("<pre class=\"chroma\">\n<code>x</code></pre>"));
        assert!(!sniff_code("<p>no code here</p>"));
    }

    #[test]
    fn sniffs_math_markers_and_delimiters() {
        assert!(sniff_math("<span class=\"math inline\">x</span>"));
        assert!(sniff_math("<span class=\"katex\">x</span>"));
        assert!(sniff_math("<p>price is $5 and $7</p>"));
        assert!(sniff_math("<p>\\(a^2\\)</p>"));
        assert!(!sniff_math("<p>plain text</p>"));
    }

    #[test]
    fn sniffs_mermaid_containers() {
        assert!(sniff_mermaid("<div class=\"mermaid\">graph TD;</div>"));
        assert!(!sniff_mermaid("<div class=\"diagram\">nope</div>"));
    }
}

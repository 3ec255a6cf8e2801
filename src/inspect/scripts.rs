//! Page-side expressions evaluated through `Runtime.evaluate`

/// The element the page considers focused.
///
/// A reference stored by the page-side helper wins over `document.activeElement`. Shadow
/// hosts that delegate focus are followed inward: the shadow root's own active element,
/// then anything matching `:focus` inside it, then its first focusable element.
pub const LIVE_REFERENCE: &str = r#"(() => {
  const FOCUSABLE = 'a[href], area[href], button:not([disabled]), input:not([disabled]), select:not([disabled]), textarea:not([disabled]), iframe, [tabindex]:not([tabindex="-1"]), [contenteditable="true"]';
  const stored = window.__axOxideLiveReference;
  let element = stored && stored.isConnected ? stored : document.activeElement;
  const visited = new Set();
  while (element && element.shadowRoot && element.shadowRoot.delegatesFocus && !visited.has(element)) {
    visited.add(element);
    const root = element.shadowRoot;
    const inner = root.activeElement || root.querySelector(':focus') || root.querySelector(FOCUSABLE);
    if (!inner) break;
    element = inner;
  }
  return element || null;
})()"#;

/// `document.activeElement`, without the stored-reference and shadow handling
pub const ACTIVE_ELEMENT: &str = "document.activeElement";

/// `document.querySelector` for an arbitrary selector
pub fn query_selector(selector: &str) -> String {
    // A JSON string literal is a valid JS string literal
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!("document.querySelector({})", literal)
}

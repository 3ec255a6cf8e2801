//! # Frame resolution
//!
//! Logical frame handles come from the host's navigation listing; protocol frame ids come
//! from `Page.getFrameTree`. The two identifier spaces share nothing but the frame URL, so
//! resolution matches on URL with progressively looser rules:
//!
//! 1. exact URL
//! 2. URL with the fragment stripped
//! 3. the only protocol frame on the same origin
//! 4. the same-origin frame whose path is the longest prefix of the target path, on a
//!    segment boundary
//!
//! Resolution is best-effort: any failure yields `None` and callers fall back to the main
//! document.

use reqwest::Url;
use tracing::{debug, instrument};

use crate::cdp::types::Frame;
use crate::session::SessionContext;
use crate::types::{FrameHandle, FrameScope};
use crate::Result;

/// World name for the inspector's isolated execution contexts
pub const INSPECTOR_WORLD: &str = "ax-oxide-inspector";

/// Protocol frame id for a logical handle; `None` for the main frame or when nothing matches
pub async fn resolve_protocol_frame(context: &SessionContext, handle: FrameHandle) -> Option<String> {
    locate_frame(context, handle).await.map(|frame| frame.id)
}

/// Document scope a logical handle refers to, falling back to the main document
#[instrument(skip(context), fields(resource = %context.resource()))]
pub async fn resolve_scope(context: &SessionContext, handle: FrameHandle) -> FrameScope {
    match locate_frame(context, handle).await {
        // A handle can name the top frame itself
        Some(frame) if frame.parent_id.is_none() => FrameScope::Main,
        Some(frame) => FrameScope::Frame(frame.id),
        None => {
            if !handle.is_main() {
                debug!("Frame {} not resolved, using main document", handle);
            }
            FrameScope::Main
        }
    }
}

async fn locate_frame(context: &SessionContext, handle: FrameHandle) -> Option<Frame> {
    if handle.is_main() {
        return None;
    }

    let (listing, tree) = futures::join!(
        context.frame_directory().list_frames(context.resource()),
        context.client().frame_tree()
    );
    let listing = match listing {
        Ok(listing) => listing,
        Err(e) => {
            debug!("Frame listing failed: {}", e);
            return None;
        }
    };
    let tree = match tree {
        Ok(tree) => tree,
        Err(e) => {
            debug!("Page.getFrameTree failed: {}", e);
            return None;
        }
    };

    let target = listing.iter().find(|frame| frame.handle == handle)?;
    let frames = tree.flatten();
    match_protocol_frame(&target.url, &frames).cloned()
}

/// Pick the protocol frame that best matches `target_url`
pub fn match_protocol_frame<'a>(target_url: &str, frames: &[&'a Frame]) -> Option<&'a Frame> {
    if let Some(frame) = frames
        .iter()
        .find(|f| f.url == target_url || full_url(f) == target_url)
    {
        return Some(*frame);
    }

    let bare_target = strip_fragment(target_url);
    if let Some(frame) = frames.iter().find(|f| strip_fragment(&f.url) == bare_target) {
        return Some(*frame);
    }

    let target = Url::parse(target_url).ok()?;
    let same_origin: Vec<(&'a Frame, Url)> = frames
        .iter()
        .filter_map(|f| Url::parse(&f.url).ok().map(|url| (*f, url)))
        .filter(|(_, url)| url.origin() == target.origin())
        .collect();

    if let [(only, _)] = same_origin.as_slice() {
        return Some(*only);
    }

    let mut best: Option<(&'a Frame, usize)> = None;
    for (frame, url) in &same_origin {
        let path = url.path();
        if !is_path_prefix(path, target.path()) {
            continue;
        }
        // Strictly longer wins, so ties keep the first in tree order
        if best.map_or(true, |(_, len)| path.len() > len) {
            best = Some((*frame, path.len()));
        }
    }
    best.map(|(frame, _)| frame)
}

fn full_url(frame: &Frame) -> String {
    format!("{}{}", frame.url, frame.url_fragment.as_deref().unwrap_or(""))
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}

/// `prefix` covers `path` up to a `/` boundary
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix == path {
        return true;
    }
    path.starts_with(prefix) && (prefix.ends_with('/') || path[prefix.len()..].starts_with('/'))
}

/// Execution context of `world` in `frame_id`, created on first use and cached per session
pub async fn get_or_create_isolated_context(
    context: &SessionContext,
    frame_id: &str,
    world: &str,
) -> Result<i64> {
    if let Some(context_id) = context.frame_context(frame_id, world) {
        return Ok(context_id);
    }

    let context_id = context.client().create_isolated_world(frame_id, world).await?;
    debug!("Created isolated world {} in frame {}: {}", world, frame_id, context_id);
    context.store_frame_context(frame_id, world, context_id);
    Ok(context_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::cdp::mock::{MockDebugger, MockFrameDirectory};
    use crate::cdp::NavigationFrame;
    use crate::session::{ExecuteOptions, SessionConfig, SessionManager};
    use crate::types::ResourceId;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(id: &str, parent: Option<&str>, url: &str) -> Frame {
        Frame {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            url: url.to_string(),
            url_fragment: None,
        }
    }

    #[test]
    fn test_exact_match_wins() {
        let frames = [
            frame("MAIN", None, "https://example.com/"),
            frame("A", Some("MAIN"), "https://example.com/widget"),
            frame("B", Some("MAIN"), "https://example.com/widget?x=1"),
        ];
        let refs: Vec<&Frame> = frames.iter().collect();
        assert_eq!(
            match_protocol_frame("https://example.com/widget?x=1", &refs).map(|f| f.id.as_str()),
            Some("B")
        );
    }

    #[test]
    fn test_fragment_is_ignored_second() {
        let frames = [
            frame("MAIN", None, "https://example.com/"),
            frame("A", Some("MAIN"), "https://other.test/embed"),
        ];
        let refs: Vec<&Frame> = frames.iter().collect();
        assert_eq!(
            match_protocol_frame("https://other.test/embed#step-2", &refs).map(|f| f.id.as_str()),
            Some("A")
        );
    }

    #[test]
    fn test_unique_same_origin_frame() {
        let frames = [
            frame("MAIN", None, "https://example.com/"),
            frame("A", Some("MAIN"), "https://pay.test/checkout/start"),
        ];
        let refs: Vec<&Frame> = frames.iter().collect();
        assert_eq!(
            match_protocol_frame("https://pay.test/checkout/confirm", &refs).map(|f| f.id.as_str()),
            Some("A")
        );
    }

    #[test]
    fn test_longest_prefix_on_segment_boundary() {
        let frames = [
            frame("MAIN", None, "https://app.test/"),
            frame("APPLE", Some("MAIN"), "https://app.test/apple"),
            frame("APP", Some("MAIN"), "https://app.test/app"),
            frame("DEEP", Some("MAIN"), "https://app.test/app/settings"),
        ];
        let refs: Vec<&Frame> = frames.iter().collect();
        assert_eq!(
            match_protocol_frame("https://app.test/app/settings/profile", &refs).map(|f| f.id.as_str()),
            Some("DEEP")
        );
        // "/apple" is not a segment prefix of "/app/x"; "/app" is
        assert_eq!(
            match_protocol_frame("https://app.test/app/x", &refs).map(|f| f.id.as_str()),
            Some("APP")
        );
    }

    #[test]
    fn test_no_match_is_none() {
        let frames = [frame("MAIN", None, "https://example.com/")];
        let refs: Vec<&Frame> = frames.iter().collect();
        assert!(match_protocol_frame("https://elsewhere.test/", &refs).is_none());
        assert!(match_protocol_frame("not a url", &refs).is_none());
    }

    fn frame_tree_response() -> serde_json::Value {
        json!({
            "frameTree": {
                "frame": {"id": "MAIN", "url": "https://example.com/"},
                "childFrames": [
                    {"frame": {"id": "CHILD", "parentId": "MAIN", "url": "https://widgets.test/w"}}
                ]
            }
        })
    }

    async fn setup() -> (Arc<MockDebugger>, Arc<MockFrameDirectory>, Arc<SessionManager>, ResourceId) {
        let mock = Arc::new(MockDebugger::new());
        let directory = Arc::new(MockFrameDirectory::new());
        let manager = SessionManager::new(
            mock.clone(),
            directory.clone(),
            SessionConfig::default(),
            &CacheConfig::default(),
        );
        let resource = ResourceId::parse("tab-1").unwrap();
        mock.on("Page.getFrameTree", |_| Ok(frame_tree_response()));
        directory.set_frames(
            &resource,
            vec![
                NavigationFrame {
                    handle: FrameHandle(0),
                    parent: None,
                    url: "https://example.com/".into(),
                },
                NavigationFrame {
                    handle: FrameHandle(7),
                    parent: Some(FrameHandle(0)),
                    url: "https://widgets.test/w#open".into(),
                },
            ],
        );
        (mock, directory, manager, resource)
    }

    #[tokio::test]
    async fn test_scope_resolution_through_session() {
        let (mock, _directory, manager, resource) = setup().await;

        let scopes = manager
            .execute_serialized(&resource, ExecuteOptions::default(), |ctx| async move {
                Ok((
                    resolve_scope(&ctx, FrameHandle(7)).await,
                    resolve_scope(&ctx, FrameHandle(0)).await,
                    resolve_scope(&ctx, FrameHandle(99)).await,
                ))
            })
            .await
            .unwrap();

        assert_eq!(scopes.0, FrameScope::Frame("CHILD".into()));
        assert_eq!(scopes.1, FrameScope::Main);
        assert_eq!(scopes.2, FrameScope::Main);
        // The main handle never needs the frame tree
        assert_eq!(mock.count("Page.getFrameTree"), 2);
    }

    #[tokio::test]
    async fn test_frame_tree_failure_yields_none() {
        let (mock, _directory, manager, resource) = setup().await;
        mock.fail_next_command("Page.getFrameTree", crate::Error::cdp("Page domain not enabled"));

        let resolved = manager
            .execute_serialized(&resource, ExecuteOptions::default(), |ctx| async move {
                Ok(resolve_protocol_frame(&ctx, FrameHandle(7)).await)
            })
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_context_cached_for_a_few_seconds() {
        let (mock, _directory, manager, resource) = setup().await;
        let next_id = Arc::new(std::sync::atomic::AtomicI64::new(40));
        let ids = next_id.clone();
        mock.on("Page.createIsolatedWorld", move |_| {
            Ok(json!({ "executionContextId": ids.fetch_add(1, std::sync::atomic::Ordering::SeqCst) }))
        });

        let lookup = || {
            manager.execute_serialized(&resource, ExecuteOptions::default(), |ctx| async move {
                get_or_create_isolated_context(&ctx, "CHILD", INSPECTOR_WORLD).await
            })
        };

        assert_eq!(lookup().await.unwrap(), 40);
        assert_eq!(lookup().await.unwrap(), 40);
        assert_eq!(mock.count("Page.createIsolatedWorld"), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(lookup().await.unwrap(), 41);
        assert_eq!(mock.count("Page.createIsolatedWorld"), 2);
    }
}

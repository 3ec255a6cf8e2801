//! Element resolution pipeline
//!
//! Strategies, in order:
//! 1. direct reference: the element the page considers focused, through the micro-cache
//! 2. selector: cached document root and node id, isolated-world query in sub-frames,
//!    `DOM.querySelector` with a single root refresh
//! 3. `document.activeElement`, only when no selector was given
//!
//! The winning node id is expanded into its accessibility subtree and assembled into an
//! [`AccessibilityInfo`].

use tracing::{debug, instrument};

use crate::cdp::types::{AxNode, Node};
use crate::frame::{self, INSPECTOR_WORLD};
use crate::inspect::record::{AccessibilityInfo, ActiveDescendant, TreeNode};
use crate::inspect::scripts;
use crate::inspect::selection::{self, Subtree};
use crate::inspect::{NODE_NOT_FOUND, NO_AX_NODE};
use crate::session::SessionContext;
use crate::types::{FrameHandle, FrameScope, ResolvedNode};
use crate::{Error, Result};

/// What to inspect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    pub frame: FrameHandle,
    /// Validated selector, if any
    pub selector: Option<String>,
    pub use_direct_reference: bool,
}

/// Failures that mean "no such node" rather than a broken session
fn is_miss(error: &Error) -> bool {
    matches!(
        error,
        Error::NotFound(_) | Error::Cdp(_) | Error::ScriptExecutionFailed(_)
    )
}

fn miss_as_none<T>(result: Result<Option<T>>, step: &str) -> Result<Option<T>> {
    match result {
        Err(e) if is_miss(&e) => {
            debug!("{} found nothing: {}", step, e);
            Ok(None)
        }
        other => other,
    }
}

/// Resolve the request to a node and assemble its record.
///
/// `Error::NotFound` when nothing resolves or the subtree is empty.
#[instrument(skip(context, request), fields(resource = %context.resource(), frame = %request.frame))]
pub async fn resolve_accessibility_info(
    context: &SessionContext,
    request: &ResolveRequest,
) -> Result<AccessibilityInfo> {
    let resource = context.resource();

    if request.use_direct_reference {
        if let Some(record) = context.caches(|c| c.micro_record(resource, request.frame))? {
            debug!("Micro-cache hit");
            return Ok(record);
        }

        match resolve_live_reference(context, request.frame).await {
            Ok(Some(node)) => {
                let record = assemble(context, &node).await?;
                context.store(|c| c.store_micro_record(resource, request.frame, record.clone()))?;
                return Ok(record);
            }
            Ok(None) => debug!("No live reference"),
            Err(e) => debug!("Live reference unusable, trying selector: {}", e),
        }
    }

    let node = match request.selector.as_deref() {
        Some(selector) => resolve_selector(context, request.frame, selector).await?,
        None => resolve_active_element(context, request.frame).await?,
    };

    match node {
        Some(node) => assemble(context, &node).await,
        None => Err(Error::not_found(NODE_NOT_FOUND)),
    }
}

/// Whole accessibility tree of the frame
#[instrument(skip(context), fields(resource = %context.resource()))]
pub async fn full_tree(context: &SessionContext, frame: FrameHandle) -> Result<Vec<TreeNode>> {
    let scope = frame::resolve_scope(context, frame).await;
    let nodes = context.client().full_ax_tree(scope.protocol_frame_id()).await?;
    Ok(nodes.iter().map(TreeNode::from).collect())
}

/// Scope and execution context to evaluate page scripts in
async fn evaluation_target(context: &SessionContext, frame: FrameHandle) -> Result<(FrameScope, Option<i64>)> {
    let scope = frame::resolve_scope(context, frame).await;
    let context_id = match &scope {
        FrameScope::Main => None,
        FrameScope::Frame(frame_id) => {
            Some(frame::get_or_create_isolated_context(context, frame_id, INSPECTOR_WORLD).await?)
        }
    };
    Ok((scope, context_id))
}

/// Evaluate `expression` and turn the resulting element into a node id.
///
/// Errors from `DOM.requestNode` propagate; the caller decides whether they are fatal.
async fn evaluate_to_node(
    context: &SessionContext,
    expression: &str,
    context_id: Option<i64>,
    scope: FrameScope,
) -> Result<Option<ResolvedNode>> {
    let client = context.client();
    let remote = client.evaluate(expression, context_id).await?;
    let Some(object_id) = remote.node_handle() else {
        return Ok(None);
    };

    // Node ids are only handed out once the scope's document has been requested
    document_root(context, &scope, false).await?;
    let node_id = client.request_node(object_id).await;
    client.release_object(object_id).await;

    Ok(Some(ResolvedNode {
        node_id: node_id?,
        scope,
    }))
}

async fn resolve_live_reference(context: &SessionContext, frame: FrameHandle) -> Result<Option<ResolvedNode>> {
    let (scope, context_id) = evaluation_target(context, frame).await?;
    evaluate_to_node(context, scripts::LIVE_REFERENCE, context_id, scope).await
}

async fn resolve_active_element(context: &SessionContext, frame: FrameHandle) -> Result<Option<ResolvedNode>> {
    let (scope, context_id) = evaluation_target(context, frame).await?;
    miss_as_none(
        evaluate_to_node(context, scripts::ACTIVE_ELEMENT, context_id, scope).await,
        "document.activeElement",
    )
}

async fn resolve_selector(
    context: &SessionContext,
    frame: FrameHandle,
    selector: &str,
) -> Result<Option<ResolvedNode>> {
    let resource = context.resource();
    let scope = frame::resolve_scope(context, frame).await;
    let mut root = document_root(context, &scope, false).await?;

    if let Some(node_id) = context.caches(|c| c.node_id(resource, &scope, selector))? {
        if still_valid(context, node_id).await? {
            debug!("Node cache hit for {}", selector);
            return Ok(Some(ResolvedNode { node_id, scope }));
        }
        debug!("Cached node {} for {} is stale", node_id, selector);
        context.caches(|c| c.forget_node_id(resource, &scope, selector))?;
    }

    let mut found = None;
    if let FrameScope::Frame(frame_id) = &scope {
        found = miss_as_none(query_in_frame(context, frame_id, selector).await, "isolated query")?;
    }
    if found.is_none() {
        found = query_document(context, root, selector).await?;
    }
    if found.is_none() {
        root = document_root(context, &scope, true).await?;
        found = query_document(context, root, selector).await?;
    }

    if let Some(node_id) = found {
        context.store(|c| c.store_node_id(resource, &scope, selector, node_id))?;
    }
    Ok(found.map(|node_id| ResolvedNode { node_id, scope }))
}

async fn query_in_frame(context: &SessionContext, frame_id: &str, selector: &str) -> Result<Option<i64>> {
    let context_id = frame::get_or_create_isolated_context(context, frame_id, INSPECTOR_WORLD).await?;
    let scope = FrameScope::Frame(frame_id.to_string());
    let node = evaluate_to_node(context, &scripts::query_selector(selector), Some(context_id), scope).await?;
    Ok(node.map(|n| n.node_id))
}

async fn query_document(context: &SessionContext, root: Option<i64>, selector: &str) -> Result<Option<i64>> {
    let Some(root) = root else {
        return Ok(None);
    };
    miss_as_none(
        context.client().query_selector(root, selector).await,
        "DOM.querySelector",
    )
}

/// A cached node id survives as long as the accessibility layer still knows it
async fn still_valid(context: &SessionContext, node_id: i64) -> Result<bool> {
    match context.client().partial_ax_tree(node_id, false).await {
        Ok(nodes) => Ok(!nodes.is_empty()),
        Err(e) if is_miss(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Document root node id of `scope`, from cache unless `refresh`
async fn document_root(context: &SessionContext, scope: &FrameScope, refresh: bool) -> Result<Option<i64>> {
    let resource = context.resource();
    if !refresh {
        if let Some(root) = context.caches(|c| c.document_root(resource, scope))? {
            return Ok(Some(root));
        }
    }

    let root = match scope {
        FrameScope::Main => Some(context.client().get_document(1, false).await?.node_id),
        FrameScope::Frame(frame_id) => {
            let document = context.client().get_document(-1, true).await?;
            frame_document(&document, frame_id)
        }
    };

    context.store(|c| match root {
        Some(node_id) => c.store_document_root(resource, scope, node_id),
        None => c.forget_document_root(resource, scope),
    })?;
    Ok(root)
}

/// Node id of the document hosted by frame `frame_id`
fn frame_document(root: &Node, frame_id: &str) -> Option<i64> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(document) = &node.content_document {
            if node.frame_id.as_deref() == Some(frame_id) {
                return Some(document.node_id);
            }
            stack.push(document.as_ref());
        }
        if let Some(children) = &node.children {
            stack.extend(children.iter());
        }
    }
    None
}

/// Fetch the subtree around `node` and build its record
async fn assemble(context: &SessionContext, node: &ResolvedNode) -> Result<AccessibilityInfo> {
    let client = context.client();
    let nodes = match client.partial_ax_tree(node.node_id, true).await {
        Ok(nodes) => nodes,
        Err(e) if is_miss(&e) => {
            debug!("Subtree fetch for {} failed: {}", node.node_id, e);
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let subtree = Subtree::new(&nodes);
    let chosen = subtree
        .select()
        .ok_or_else(|| Error::not_found(NO_AX_NODE))?;

    // Attributes belong to the resolved element; a descendant pick relies on its properties
    let is_root = subtree.root().map(|r| r.node_id == chosen.node_id).unwrap_or(false);
    let attributes = if is_root {
        match client.get_attributes(node.node_id).await {
            Ok(attributes) => attributes,
            Err(e) if is_miss(&e) => Vec::new(),
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };

    let mut record = selection::build_record(chosen, &attributes);
    record.group = subtree.group_of(chosen);
    record.active_descendant = active_descendant(context, &subtree, chosen).await?;
    Ok(record)
}

/// Prefer the relationship payload already fetched; otherwise look the node up by backend id
async fn active_descendant(
    context: &SessionContext,
    subtree: &Subtree<'_>,
    chosen: &AxNode,
) -> Result<Option<ActiveDescendant>> {
    let Some(target) = selection::active_descendant_target(chosen) else {
        return Ok(None);
    };
    if let Some(node) = subtree.by_backend_id(target) {
        return Ok(Some(selection::describe_active_descendant(node)));
    }

    match context.client().partial_ax_tree_by_backend(target).await {
        Ok(nodes) => Ok(nodes.first().map(selection::describe_active_descendant)),
        Err(e) if is_miss(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

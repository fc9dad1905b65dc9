//! Outline rendering of the live tree.
//!
//! Every node becomes one indented row. Buttons and links become clickable
//! rows; everything else is shown as text.

use serde_json::Value;
use tether_ui_host_runtime::env::Location;
use tether_ui_host_runtime::session::SessionContext;
use tether_ui_host_runtime::{BehaviorError, BehaviorTable, Node, NodeBehavior, bindings};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineItem {
    pub kind: String,
    pub label: String,
    pub href: Option<String>,
    pub disabled: bool,
}

impl OutlineItem {
    fn caption(&self, tag: &str) -> String {
        if !self.label.is_empty() {
            self.label.clone()
        } else if !tag.is_empty() {
            format!("<{tag}>")
        } else {
            format!("[{}]", self.kind)
        }
    }
}

pub fn behaviors() -> BehaviorTable<OutlineItem> {
    let mut table = BehaviorTable::new();
    table
        .register("container", item())
        .register("text", item())
        .register("button", item().with_event_binding(bindings::on_click()))
        .register("link", item().with_event_binding(bindings::on_click()))
        .register(
            "input",
            item()
                .with_event_binding(bindings::on_input())
                .with_event_binding(bindings::on_change()),
        )
        .register("plaintext", NodeBehavior::new(create, update_plaintext))
        .register_tag_prefix("sl-", item())
        .set_fallback(item());
    table
}

fn item() -> NodeBehavior<OutlineItem> {
    NodeBehavior::new(create, update_item)
}

fn create(node: &Node) -> Result<OutlineItem, BehaviorError> {
    Ok(OutlineItem {
        kind: node.kind.clone(),
        ..OutlineItem::default()
    })
}

fn update_item(
    item: &mut OutlineItem,
    kind: &str,
    property: &str,
    value: &Value,
) -> Result<(), BehaviorError> {
    match property {
        "label" | "content" | "text" | "value" => item.label = display(value),
        "href" => {
            item.href = value
                .as_str()
                .filter(|href| !href.is_empty())
                .map(str::to_string);
        }
        "disabled" => item.disabled = value.as_bool().unwrap_or(false),
        _ => tracing::trace!(kind, property, "property not shown in outline"),
    }
    Ok(())
}

fn update_plaintext(
    item: &mut OutlineItem,
    kind: &str,
    property: &str,
    value: &Value,
) -> Result<(), BehaviorError> {
    if property != "content" {
        return Err(BehaviorError::UnknownProperty {
            kind: kind.to_string(),
            property: property.to_string(),
        });
    }

    item.label = display(value);
    Ok(())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub key: String,
    pub depth: usize,
    pub label: String,
    pub clickable: bool,
}

/// Rows in pre-order. A row is clickable when its element handles clicks
/// and is not disabled.
pub fn snapshot(cx: &SessionContext<OutlineItem>) -> Vec<RowView> {
    cx.tree
        .walk()
        .into_iter()
        .filter_map(|(id, depth)| {
            let element = cx.tree.get(id)?;
            let clickable = !element.handle.disabled
                && element.bindings().iter().any(|binding| binding.event() == "click");

            Some(RowView {
                key: element.key.clone(),
                depth,
                label: element.handle.caption(&element.tag),
                clickable,
            })
        })
        .collect()
}

/// The `href` of the link at `key`, if that element is a link.
pub fn link_target(cx: &SessionContext<OutlineItem>, key: &str) -> Option<String> {
    let entry = cx.elements.get(key)?;
    let element = cx.tree.get(entry.element)?;
    if element.kind != "link" {
        return None;
    }
    element.handle.href.clone()
}

/// Resolves `href` against `current`. External targets resolve to `None`;
/// they are not followed.
pub fn resolve_href(current: &Location, href: &str) -> Option<String> {
    if href.contains("://") || href.starts_with("//") {
        return None;
    }

    let resolved = match href.chars().next() {
        None => current.to_string(),
        Some('/') => href.to_string(),
        Some('?') => format!("{}{href}", current.path),
        Some('#') => {
            let mut base = current.clone();
            base.hash_arg.clear();
            format!("{base}{href}")
        }
        Some(_) => {
            let dir = match current.path.rfind('/') {
                Some(at) => &current.path[..=at],
                None => "/",
            };
            format!("{dir}{href}")
        }
    };
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_ui_host_runtime::protocol::decode_server_frame;
    use tether_ui_host_runtime::{Outbox, Session, UiEvent, Update};

    fn session_with(dom: &str) -> Session<OutlineItem> {
        let mut session = Session::new(behaviors(), Outbox::new());
        let frame = decode_server_frame(&format!(r#"{{"dom":{dom}}}"#)).expect("frame");
        let outcome = session.handle_frame(&frame);
        assert!(outcome.is_clean(), "{:?}", outcome.errors);
        session
    }

    #[test]
    fn rows_follow_tree_order_with_depth() {
        let session = session_with(
            r#"{"key":"root","kind":"container","children":[
                {"key":"title","kind":"text","props":{"content":"Inbox"}},
                {"key":"list","kind":"container","tag":"ul","children":[
                    {"key":"open","kind":"button","props":{"label":"Open"}},
                    {"key":"off","kind":"button","props":{"label":"Off","disabled":true}}
                ]},
                {"key":"home","kind":"link","props":{"label":"Home","href":"/"}}
            ]}"#,
        );

        let rows = snapshot(session.context());
        let summary: Vec<(&str, usize, &str, bool)> = rows
            .iter()
            .map(|row| (row.key.as_str(), row.depth, row.label.as_str(), row.clickable))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("root", 0, "[container]", false),
                ("title", 1, "Inbox", false),
                ("list", 1, "<ul>", false),
                ("open", 2, "Open", true),
                ("off", 2, "Off", false),
                ("home", 1, "Home", true),
            ]
        );
    }

    #[test]
    fn plaintext_rejects_other_properties() {
        let mut session = Session::new(behaviors(), Outbox::new());
        let frame = decode_server_frame(
            r#"{"dom":{"key":"p","kind":"plaintext","props":{"content":"hi","color":"red"}}}"#,
        )
        .expect("frame");

        let outcome = session.handle_frame(&frame);

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(snapshot(session.context())[0].label, "hi");
    }

    #[test]
    fn unknown_kinds_fall_back_to_a_plain_row() {
        let session = session_with(r#"{"key":"x","kind":"carousel","props":{"items":3}}"#);

        let rows = snapshot(session.context());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "[carousel]");
        assert!(!rows[0].clickable);
    }

    #[test]
    fn clicking_a_link_reports_and_exposes_its_target() {
        let session = session_with(
            r#"{"key":"root","kind":"container","children":[
                {"key":"more","kind":"link","props":{"label":"More","href":"details"}},
                {"key":"go","kind":"button","props":{"label":"Go"}}
            ]}"#,
        );

        assert_eq!(session.dispatch_event("more", &UiEvent::new("click")), 1);
        assert_eq!(
            session.outbox().drain(),
            vec![Update::new("more", "clicked", true)]
        );
        assert_eq!(
            link_target(session.context(), "more").as_deref(),
            Some("details")
        );
        assert_eq!(link_target(session.context(), "go"), None);
        assert_eq!(link_target(session.context(), "missing"), None);
    }

    #[test]
    fn hrefs_resolve_against_the_current_location() {
        let current = Location::parse("/inbox/42?tab=all#top");

        assert_eq!(resolve_href(&current, "/settings").as_deref(), Some("/settings"));
        assert_eq!(resolve_href(&current, "43").as_deref(), Some("/inbox/43"));
        assert_eq!(
            resolve_href(&current, "?tab=unread").as_deref(),
            Some("/inbox/42?tab=unread")
        );
        assert_eq!(
            resolve_href(&current, "#bottom").as_deref(),
            Some("/inbox/42?tab=all#bottom")
        );
        assert_eq!(
            resolve_href(&current, "").as_deref(),
            Some("/inbox/42?tab=all#top")
        );
        assert_eq!(resolve_href(&current, "https://example.com/"), None);
        assert_eq!(resolve_href(&current, "//example.com/"), None);
    }
}

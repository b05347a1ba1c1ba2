//! [`ElementProperties`] extraction from document nodes.

use std::collections::BTreeMap;

use dom_snapshot::{Document, NodeId, XPathIndex};
use heal_core_types::ElementProperties;

/// Elements that never render and so are never replacement candidates.
pub const NON_RENDERED_TAGS: &[&str] = &[
    "html", "head", "meta", "link", "script", "style", "title", "noscript", "template", "base",
];

pub const MAX_NEIGHBOR_TEXTS: usize = 10;

const BUTTON_INPUT_TYPES: &[&str] = &["submit", "button", "reset"];
const CLICKABLE_ROLES: &[&str] = &["button", "link", "menuitem", "tab", "checkbox", "radio"];

pub fn is_candidate(doc: &Document, node: NodeId) -> bool {
    doc.tag(node)
        .map_or(false, |tag| !NON_RENDERED_TAGS.contains(&tag))
}

/// Properties of every candidate element, in document order.
pub fn extract_all(doc: &Document) -> Vec<(NodeId, ElementProperties)> {
    let paths = XPathIndex::new(doc);
    doc.elements()
        .filter(|node| is_candidate(doc, *node))
        .map(|node| {
            let xpaths = (paths.absolute(node), paths.relative(node));
            (node, extract_with_paths(doc, node, xpaths))
        })
        .collect()
}

pub fn extract(doc: &Document, node: NodeId) -> ElementProperties {
    let xpaths = (doc.absolute_xpath(node), doc.relative_xpath(node));
    extract_with_paths(doc, node, xpaths)
}

fn extract_with_paths(
    doc: &Document,
    node: NodeId,
    (absolute_xpath, relative_xpath): (String, String),
) -> ElementProperties {
    let attr = |name: &str| doc.attr(node, name).unwrap_or_default().to_string();
    let tag = doc.tag(node).unwrap_or_default().to_string();
    let geometry = doc.geometry(node).unwrap_or_default();

    let mut neighbor_texts = Vec::new();
    let mut sibling_tags = Vec::new();
    let mut parent_tag = String::new();
    if let Some(parent) = doc.parent(node) {
        parent_tag = doc.tag(parent).unwrap_or_default().to_string();
        for sibling in doc.element_children(parent).filter(|s| *s != node) {
            if sibling_tags.len() >= MAX_NEIGHBOR_TEXTS
                && neighbor_texts.len() >= MAX_NEIGHBOR_TEXTS
            {
                break;
            }
            if sibling_tags.len() < MAX_NEIGHBOR_TEXTS {
                sibling_tags.push(doc.tag(sibling).unwrap_or_default().to_string());
            }
            if neighbor_texts.len() < MAX_NEIGHBOR_TEXTS {
                let text = doc.normalized_text(sibling);
                if !text.is_empty() {
                    neighbor_texts.push(text);
                }
            }
        }
    }

    let type_ = attr("type").to_ascii_lowercase();
    let role = attr("role");
    let is_button = tag == "button"
        || (tag == "input" && BUTTON_INPUT_TYPES.contains(&type_.as_str()))
        || role == "button";
    let is_input = matches!(tag.as_str(), "input" | "textarea" | "select");
    let is_clickable = is_button
        || (tag == "a" && doc.attr(node, "href").is_some())
        || doc.attr(node, "onclick").is_some()
        || CLICKABLE_ROLES.contains(&role.as_str());

    let attributes: BTreeMap<String, String> = doc
        .attributes(node)
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    ElementProperties {
        id: attr("id"),
        name: attr("name"),
        type_,
        aria_label: attr("aria-label"),
        class_name: attr("class"),
        href: attr("href"),
        alt: attr("alt"),
        src: attr("src"),
        role,
        absolute_xpath,
        relative_xpath,
        x: geometry.x,
        y: geometry.y,
        width: geometry.width,
        height: geometry.height,
        visible_text: doc.normalized_text(node),
        placeholder: attr("placeholder"),
        value: attr("value"),
        neighbor_texts,
        parent_tag,
        sibling_tags,
        is_button,
        is_clickable,
        is_input,
        attributes,
        tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::parse_html(
            r#"<html><head><title>Login</title></head><body>
                <form id="login">
                    <label>User</label>
                    <input id="user" name="user" type="text" placeholder="Username">
                    <input type="SUBMIT" value="Go" style="left: 10px; top: 20px; width: 80px; height: 30px">
                    <div role="button" class="fake btn">Fake</div>
                    <a href="/help">Help</a>
                </form>
            </body></html>"#,
        )
    }

    fn find(doc: &Document, tag: &str, nth: usize) -> NodeId {
        doc.elements()
            .filter(|id| doc.tag(*id) == Some(tag))
            .nth(nth)
            .unwrap()
    }

    #[test]
    fn extracts_attributes_and_flags() {
        let doc = doc();
        let user = extract(&doc, find(&doc, "input", 0));
        assert_eq!(user.id, "user");
        assert_eq!(user.placeholder, "Username");
        assert!(user.is_input && !user.is_button && !user.is_clickable);
        assert_eq!(user.parent_tag, "form");
        assert_eq!(user.relative_xpath, "//*[@id='login']/input[1]");
        assert_eq!(user.attributes.get("name").map(String::as_str), Some("user"));

        let submit = extract(&doc, find(&doc, "input", 1));
        assert_eq!(submit.type_, "submit");
        assert!(submit.is_button && submit.is_clickable && submit.is_input);
        assert_eq!((submit.x, submit.y, submit.width, submit.height), (10.0, 20.0, 80.0, 30.0));

        let fake = extract(&doc, find(&doc, "div", 0));
        assert!(fake.is_button);
        assert_eq!(fake.visible_text, "Fake");

        let link = extract(&doc, find(&doc, "a", 0));
        assert!(link.is_clickable && !link.is_button);
    }

    #[test]
    fn neighbors_skip_self_and_empty_text() {
        let doc = doc();
        let fake = extract(&doc, find(&doc, "div", 0));
        assert_eq!(fake.neighbor_texts, vec!["User", "Help"]);
        assert_eq!(fake.sibling_tags, vec!["label", "input", "input", "a"]);
    }

    #[test]
    fn non_rendered_elements_are_not_candidates() {
        let doc = doc();
        let tags: Vec<String> = extract_all(&doc).into_iter().map(|(_, p)| p.tag).collect();
        assert!(!tags.iter().any(|t| t == "title" || t == "head" || t == "html"));
        assert!(tags.contains(&"body".to_string()));
        assert_eq!(tags.iter().filter(|t| *t == "input").count(), 2);
    }

    #[test]
    fn neighbor_lists_are_capped() {
        let mut markup = String::from("<ul>");
        for i in 0..15 {
            markup.push_str(&format!("<li>item {i}</li>"));
        }
        markup.push_str("</ul>");
        let doc = Document::parse_html(&markup);
        let first = find(&doc, "li", 0);
        let props = extract(&doc, first);
        assert_eq!(props.neighbor_texts.len(), MAX_NEIGHBOR_TEXTS);
        assert_eq!(props.sibling_tags.len(), MAX_NEIGHBOR_TEXTS);
        assert_eq!(props.neighbor_texts[0], "item 1");
    }

    #[test]
    fn bulk_extraction_matches_single_node_paths() {
        let doc = doc();
        for (node, props) in extract_all(&doc) {
            let single = extract(&doc, node);
            assert_eq!(props.absolute_xpath, single.absolute_xpath);
            assert_eq!(props.relative_xpath, single.relative_xpath);
        }
    }
}

//! # Content Polisher
//!
//! Pure transform of fetched markup that drives the reveal protocol.
//!
//! In letter mode, every word run whose character at the chosen zero-based
//! position matches the chosen letter becomes a dictionary link, and every
//! pre-existing article link survives only when the linked title passes the
//! same predicate; everything else is stripped to plain text so the reader
//! cannot click off the reveal path. In final mode every article link is
//! redirected to the final page. Plain mode just localizes article links.
//!
//! The transform holds no state and performs no I/O; concurrent invocations
//! for unrelated requests never interfere. Malformed markup never fails:
//! whatever the parser cannot make sense of is passed through as text.
use std::{cell::RefCell, rc::Rc, sync::LazyLock};

use html5ever::{
    Attribute, LocalName, QualName,
    driver::ParseOpts,
    local_name, namespace_url, ns, parse_document,
    serialize::{SerializeOpts, serialize},
    tendril::TendrilSink,
};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::{fetch::encode_component, pages::Namespace};

/// Maximal runs of 3+ letters, including the accented set used by the
/// source language.
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-zéèêàâîïôùûçœæÉÈÊÀÂÎÏÔÙÛÇŒÆ]{3,})\b").unwrap()
});

/// Article title out of an upstream `/wiki/` href.
static WIKI_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"/wiki/([^"#?:]+)"##).unwrap());

/// Ancestors whose text is never turned into links.
const TEXT_EXCLUDED: [&str; 7] = ["a", "script", "style", "code", "pre", "textarea", "noscript"];

#[derive(Clone, Debug, PartialEq)]
pub enum PolishMode {
    /// No filter: article links are localized, text is left alone.
    Plain,
    /// Letter-at-position filter; `position` is zero-based. One-based wire
    /// values are converted by the caller before reaching here.
    Letter { letter: char, position: usize },
    /// Every article link is redirected to the final page.
    Final { final_page: String },
}

pub fn polish(html: &str, mode: &PolishMode, ns: Namespace) -> String {
    let html = hide_chrome(html);
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html.as_str());

    if !matches!(mode, PolishMode::Plain) {
        link_words(&dom.document, mode, ns);
    }
    rewrite_anchors(&dom.document, mode, ns);

    serialize_dom(&dom)
}

/// Hides the upstream header/navbar chrome so the mirror's own search box
/// takes its place.
fn hide_chrome(html: &str) -> String {
    html.replacen(
        r#"<div class="vector-header-container">"#,
        r#"<div class="vector-header-container" style="display:none">"#,
        1,
    )
    .replacen(
        r#"<header class="header-container header-chrome">"#,
        r#"<header class="header-container header-chrome" style="display:none">"#,
        1,
    )
}

fn link_words(node: &Handle, mode: &PolishMode, ns: Namespace) {
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children {
        match &child.data {
            NodeData::Element { name, .. } => {
                if !TEXT_EXCLUDED.contains(&name.local.as_ref()) {
                    link_words(&child, mode, ns);
                }
            }
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if let Some(replacement) = link_runs(&text, mode, ns) {
                    replace_child(node, &child, replacement);
                }
            }
            _ => {}
        }
    }
}

/// Splits a text run into text and link nodes. Returns `None` when nothing
/// matched so untouched nodes stay untouched.
fn link_runs(text: &str, mode: &PolishMode, ns: Namespace) -> Option<Vec<Handle>> {
    let mut nodes = Vec::new();
    let mut last = 0;
    let mut linked = false;

    for caps in WORD_RE.captures_iter(text) {
        let m = caps.get(1).unwrap();
        let word = m.as_str();

        let href = match mode {
            PolishMode::Letter { letter, position } if letter_at(word, *position, *letter) => Some(
                format!("{}/{}", Namespace::Dico.route_prefix(), encode_component(word)),
            ),
            PolishMode::Final { final_page }
                if word.to_lowercase() == final_page.to_lowercase() =>
            {
                Some(local_path(ns, final_page))
            }
            _ => None,
        };

        if let Some(href) = href {
            if m.start() > last {
                nodes.push(new_text(&text[last..m.start()]));
            }
            nodes.push(new_link(&href, word));
            last = m.end();
            linked = true;
        }
    }

    if !linked {
        return None;
    }
    if last < text.len() {
        nodes.push(new_text(&text[last..]));
    }
    Some(nodes)
}

fn rewrite_anchors(node: &Handle, mode: &PolishMode, ns: Namespace) {
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children {
        if let NodeData::Element { name, attrs, .. } = &child.data {
            if name.local.as_ref() == "a" {
                if let Some(href) = attr_value(attrs, "href") {
                    if href.contains("/wiki/") {
                        rewrite_anchor(node, &child, attrs, &href, mode, ns);
                        continue;
                    }
                }
            }
        }
        rewrite_anchors(&child, mode, ns);
    }
}

fn rewrite_anchor(
    parent: &Handle,
    anchor: &Handle,
    attrs: &RefCell<Vec<Attribute>>,
    href: &str,
    mode: &PolishMode,
    ns: Namespace,
) {
    if let PolishMode::Final { final_page } = mode {
        set_attr(attrs, "href", &local_path(ns, final_page));
        return;
    }

    let Some(caps) = WIKI_HREF_RE.captures(href) else {
        return;
    };
    let title = percent_decode_str(caps.get(1).unwrap().as_str())
        .decode_utf8_lossy()
        .into_owned();
    let new_href = format!("{}/{}", ns.route_prefix(), encode_component(&title));

    match mode {
        PolishMode::Letter { letter, position } => {
            // Underscores read as spaces when testing the title.
            if letter_at(&title.replace('_', " "), *position, *letter) {
                set_attr(attrs, "href", &new_href);
            } else {
                let mut text = String::new();
                collect_text(anchor, &mut text);
                replace_child(parent, anchor, vec![new_span(&text)]);
            }
        }
        _ => set_attr(attrs, "href", &new_href),
    }
}

fn letter_at(word: &str, position: usize, letter: char) -> bool {
    word.chars()
        .nth(position)
        .is_some_and(|c| c.to_lowercase().eq(letter.to_lowercase()))
}

fn local_path(ns: Namespace, title: &str) -> String {
    format!("{}/{}", ns.route_prefix(), encode_component(title))
}

fn attr_value(attrs: &RefCell<Vec<Attribute>>, name: &str) -> Option<String> {
    attrs
        .borrow()
        .iter()
        .find(|a| a.name.local.as_ref() == name)
        .map(|a| a.value.to_string())
}

fn set_attr(attrs: &RefCell<Vec<Attribute>>, name: &str, value: &str) {
    let mut attrs = attrs.borrow_mut();
    match attrs.iter_mut().find(|a| a.name.local.as_ref() == name) {
        Some(attr) => attr.value = value.into(),
        None => attrs.push(Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name)),
            value: value.into(),
        }),
    }
}

fn collect_text(node: &Handle, out: &mut String) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => collect_text(child, out),
            _ => {}
        }
    }
}

fn new_element(local: LocalName, attrs: Vec<Attribute>) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), local),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(text.into()),
    })
}

fn new_link(href: &str, text: &str) -> Handle {
    let link = new_element(
        local_name!("a"),
        vec![Attribute {
            name: QualName::new(None, ns!(), local_name!("href")),
            value: href.into(),
        }],
    );
    link.children.borrow_mut().push(new_text(text));
    link
}

fn new_span(text: &str) -> Handle {
    let span = new_element(
        local_name!("span"),
        vec![Attribute {
            name: QualName::new(None, ns!(), local_name!("style")),
            value: "text-decoration:none".into(),
        }],
    );
    span.children.borrow_mut().push(new_text(text));
    span
}

fn replace_child(parent: &Handle, child: &Handle, replacement: Vec<Handle>) {
    let mut children = parent.children.borrow_mut();
    if let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, child)) {
        for node in &replacement {
            node.parent.set(Some(Rc::downgrade(parent)));
        }
        children.splice(index..=index, replacement);
    }
}

fn serialize_dom(dom: &RcDom) -> String {
    let document: SerializableHandle = dom.document.clone().into();
    let mut out = Vec::new();
    if serialize(&mut out, &document, SerializeOpts::default()).is_err() {
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(letter: char, position: usize) -> PolishMode {
        PolishMode::Letter { letter, position }
    }

    #[test]
    fn test_letter_filter_links_matching_words() {
        let out = polish("<p>le chat et le dog</p>", &letter('h', 1), Namespace::Wiki);

        assert!(out.contains(r#"<a href="/dicoPage/chat">chat</a>"#));
        assert!(!out.contains(r#">dog</a>"#));
    }

    #[test]
    fn test_short_runs_stay_plain() {
        let out = polish("<p>ah oh chat</p>", &letter('h', 1), Namespace::Wiki);

        assert!(out.contains(r#"<a href="/dicoPage/chat">chat</a>"#));
        assert!(!out.contains("/dicoPage/ah"));
        assert!(!out.contains("/dicoPage/oh"));
    }

    #[test]
    fn test_position_past_word_end_stays_plain() {
        let out = polish("<p>chat</p>", &letter('h', 10), Namespace::Wiki);
        assert!(!out.contains("/dicoPage/"));
    }

    #[test]
    fn test_accented_word_is_linked_and_encoded() {
        let out = polish("<p>un été chaud</p>", &letter('t', 1), Namespace::Wiki);
        assert!(out.contains(r#"<a href="/dicoPage/%C3%A9t%C3%A9">été</a>"#));
    }

    #[test]
    fn test_excluded_ancestors_left_alone() {
        let html = "<pre>chat</pre><code>chat</code><a href=\"/x\">chat</a><p><b>chat</b></p>";
        let out = polish(html, &letter('h', 1), Namespace::Wiki);

        assert!(out.contains("<pre>chat</pre>"));
        assert!(out.contains("<code>chat</code>"));
        assert!(out.contains(r#"<a href="/x">chat</a>"#));
        // descendant text of non-excluded elements is still linked
        assert!(out.contains(r#"<b><a href="/dicoPage/chat">chat</a></b>"#));
    }

    #[test]
    fn test_anchor_kept_when_title_matches() {
        let html = r#"<a href="https://fr.m.wikipedia.org/wiki/Chat">le chat</a>"#;
        let out = polish(html, &letter('h', 1), Namespace::Wiki);

        assert!(out.contains(r#"<a href="/wikiPage/Chat">le chat</a>"#));
    }

    #[test]
    fn test_anchor_stripped_when_title_fails() {
        let html = r#"<a href="https://fr.m.wikipedia.org/wiki/Dogue">le dogue</a>"#;
        let out = polish(html, &letter('h', 1), Namespace::Wiki);

        assert!(!out.contains("Dogue\""));
        assert!(out.contains(r#"<span style="text-decoration:none">le dogue</span>"#));
    }

    #[test]
    fn test_anchor_title_reads_underscores_as_spaces() {
        let html = r#"<a href="https://fr.m.wikipedia.org/wiki/Grand_chat">x</a>"#;
        let out = polish(html, &letter('r', 1), Namespace::Wiki);

        assert!(out.contains(r#"<a href="/wikiPage/Grand_chat">x</a>"#));
    }

    #[test]
    fn test_plain_mode_localizes_links() {
        let html = r#"<a href="https://fr.m.wikipedia.org/wiki/Chat">chat</a>"#;
        let out = polish(html, &PolishMode::Plain, Namespace::Dico);

        assert!(out.contains(r#"<a href="/dicoPage/Chat">chat</a>"#));
    }

    #[test]
    fn test_final_mode_redirects_every_article_link() {
        let html = concat!(
            r#"<a href="https://fr.m.wikipedia.org/wiki/Chat">le chat</a>"#,
            r#"<a href="https://fr.m.wikipedia.org/wiki/Chien">le chien</a>"#,
            r#"<a href="/autre">ailleurs</a>"#,
        );
        let mode = PolishMode::Final {
            final_page: "Paris".to_string(),
        };
        let out = polish(html, &mode, Namespace::Wiki);

        assert!(out.contains(r#"<a href="/wikiPage/Paris">le chat</a>"#));
        assert!(out.contains(r#"<a href="/wikiPage/Paris">le chien</a>"#));
        assert!(out.contains(r#"<a href="/autre">ailleurs</a>"#));
    }

    #[test]
    fn test_final_mode_links_matching_word_runs() {
        let mode = PolishMode::Final {
            final_page: "paris".to_string(),
        };
        let out = polish("<p>voir Paris un jour</p>", &mode, Namespace::Wiki);

        assert!(out.contains(r#"<a href="/wikiPage/paris">Paris</a>"#));
    }

    #[test]
    fn test_idempotent_under_identical_arguments() {
        let html = concat!(
            "<p>le chat et le dogue</p>",
            r#"<a href="https://fr.m.wikipedia.org/wiki/Chat">chat</a>"#,
            r#"<a href="https://fr.m.wikipedia.org/wiki/Dogue">dogue</a>"#,
        );

        let once = polish(html, &letter('h', 1), Namespace::Wiki);
        let twice = polish(&once, &letter('h', 1), Namespace::Wiki);
        assert_eq!(once, twice);

        let mode = PolishMode::Final {
            final_page: "Paris".to_string(),
        };
        let once = polish(html, &mode, Namespace::Wiki);
        let twice = polish(&once, &mode, Namespace::Wiki);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_markup_passes_through() {
        let out = polish("<p>chat <b>ouvert", &letter('h', 1), Namespace::Wiki);
        assert!(out.contains(r#"<a href="/dicoPage/chat">chat</a>"#));
        assert!(out.contains("ouvert"));
    }

    #[test]
    fn test_hide_chrome_marks_header_containers() {
        let html = r#"<div class="vector-header-container"><p>nav</p></div>"#;
        let out = polish(html, &PolishMode::Plain, Namespace::Wiki);
        assert!(out.contains(r#"style="display:none""#));
    }
}

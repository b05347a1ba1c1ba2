//! Rule-based locator patterns: syntactic siblings of the broken locator.
//!
//! Deterministic and dependency free, so the cascade always has something to
//! offer when the original locator has a recognisable shape.

use dom_snapshot::css::is_plain_ident;
use dom_snapshot::xpath::literal;
use heal_core_types::{CandidateSource, Locator, LocatorCandidate, StrategyKind};
use structural_fallback::strategies::css_string;

pub const RULE_CONFIDENCE: f64 = 0.5;

struct Emitter {
    original: String,
    out: Vec<LocatorCandidate>,
}

impl Emitter {
    fn emit(&mut self, strategy: StrategyKind, value: impl Into<String>, rule: &str) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        let candidate =
            LocatorCandidate::new(strategy, value, RULE_CONFIDENCE, CandidateSource::RulePattern)
                .with_reasoning(format!("rule pattern: {rule}"));
        if candidate.locator != self.original
            && self.out.iter().all(|c| c.locator != candidate.locator)
        {
            self.out.push(candidate);
        }
    }
}

/// Syntactic alternatives for `original`, most specific first.
pub fn rule_candidates(original: &Locator) -> Vec<LocatorCandidate> {
    let mut emitter = Emitter {
        original: original.to_string(),
        out: Vec::new(),
    };
    match original {
        Locator::Typed { strategy, value } => {
            let value = value.trim();
            match strategy {
                StrategyKind::Id => id_siblings(&mut emitter, "*", value),
                StrategyKind::Name => name_siblings(&mut emitter, "*", value),
                StrategyKind::Css => css_rules(&mut emitter, value),
                StrategyKind::XPath => xpath_rules(&mut emitter, value),
                StrategyKind::LinkText => {
                    emitter.emit(StrategyKind::PartialLinkText, value, "link text to partial");
                    emitter.emit(
                        StrategyKind::XPath,
                        format!("//a[normalize-space()={}]", literal(value)),
                        "link text to xpath",
                    );
                }
                StrategyKind::PartialLinkText => emitter.emit(
                    StrategyKind::XPath,
                    format!("//a[contains(normalize-space(),{})]", literal(value)),
                    "partial link text to xpath",
                ),
                StrategyKind::ClassName => class_siblings(&mut emitter, value, false),
                StrategyKind::TagName => {
                    if is_plain_ident(value) {
                        emitter.emit(StrategyKind::Css, value, "tag name to css");
                    }
                }
            }
        }
        Locator::PlainText(text) => {
            let text = text.trim();
            emitter.emit(
                StrategyKind::XPath,
                format!("//*[normalize-space()={}]", literal(text)),
                "text to xpath",
            );
            emitter.emit(StrategyKind::LinkText, text, "text to link text");
        }
    }
    emitter.out
}

fn css_id(tag: &str, id: &str) -> String {
    let tag = if tag == "*" { "" } else { tag };
    if is_plain_ident(id) {
        format!("{tag}#{id}")
    } else {
        format!("{tag}[id={}]", css_string(id))
    }
}

fn css_attr(tag: &str, attr: &str, value: &str) -> String {
    let tag = if tag == "*" { "" } else { tag };
    format!("{tag}[{attr}={}]", css_string(value))
}

fn id_siblings(emitter: &mut Emitter, tag: &str, id: &str) {
    emitter.emit(StrategyKind::Id, id, "id attribute");
    emitter.emit(StrategyKind::Css, css_id(tag, id), "id to css");
    emitter.emit(
        StrategyKind::XPath,
        format!("//{tag}[@id={}]", literal(id)),
        "id to xpath",
    );
}

fn name_siblings(emitter: &mut Emitter, tag: &str, name: &str) {
    emitter.emit(StrategyKind::Name, name, "name attribute");
    emitter.emit(StrategyKind::Css, css_attr(tag, "name", name), "name to css");
    emitter.emit(
        StrategyKind::XPath,
        format!("//{tag}[@name={}]", literal(name)),
        "name to xpath",
    );
}

fn class_siblings(emitter: &mut Emitter, class: &str, from_css: bool) {
    if !is_plain_ident(class) {
        return;
    }
    if from_css {
        emitter.emit(StrategyKind::ClassName, class, "css class to class name");
    } else {
        emitter.emit(StrategyKind::Css, format!(".{class}"), "class name to css");
    }
    emitter.emit(
        StrategyKind::XPath,
        format!("//*[contains(@class,{})]", literal(class)),
        "class to xpath",
    );
}

fn text_siblings(emitter: &mut Emitter, tag: &str, text: &str, exact: bool) {
    if exact {
        if tag == "a" {
            emitter.emit(StrategyKind::LinkText, text, "anchor text to link text");
        }
        emitter.emit(
            StrategyKind::XPath,
            format!("//*[normalize-space()={}]", literal(text)),
            "text to normalized xpath",
        );
    } else {
        if tag == "a" {
            emitter.emit(
                StrategyKind::PartialLinkText,
                text,
                "anchor text to partial link text",
            );
        }
        emitter.emit(
            StrategyKind::XPath,
            format!("//*[contains(normalize-space(),{})]", literal(text)),
            "text to normalized xpath",
        );
    }
}

fn css_rules(emitter: &mut Emitter, selector: &str) {
    if let Some(id) = selector.strip_prefix('#') {
        if is_plain_ident(id) {
            id_siblings(emitter, "*", id);
        }
        return;
    }
    if let Some(class) = selector.strip_prefix('.') {
        class_siblings(emitter, class, true);
        return;
    }
    let Some((tag, attr, value)) = css_attribute_selector(selector) else {
        if let Some((tag, id)) = selector.split_once('#') {
            if is_plain_ident(tag) && is_plain_ident(id) {
                id_siblings(emitter, tag, id);
            }
        }
        return;
    };
    let xpath_tag = if tag.is_empty() { "*" } else { tag };
    emitter.emit(
        StrategyKind::XPath,
        format!("//{xpath_tag}[@{attr}={}]", literal(value)),
        "css attribute to xpath",
    );
    match attr {
        "id" => emitter.emit(StrategyKind::Id, value, "css id attribute to id"),
        "name" => emitter.emit(StrategyKind::Name, value, "css name attribute to name"),
        _ => {}
    }
}

/// `tag[attr='v']` or `[attr="v"]` into `(tag, attr, v)`.
fn css_attribute_selector(selector: &str) -> Option<(&str, &str, &str)> {
    let (tag, rest) = selector.split_once('[')?;
    if !tag.is_empty() && !is_plain_ident(tag) {
        return None;
    }
    let body = rest.strip_suffix(']')?;
    let (attr, value) = body.split_once('=')?;
    let attr = attr.trim();
    if !is_plain_ident(attr) {
        return None;
    }
    let value = unquote(value.trim())?;
    Some((tag, attr, value))
}

fn xpath_rules(emitter: &mut Emitter, path: &str) {
    let Some((tag, predicate)) = single_predicate(path) else {
        return;
    };
    let predicate = predicate.trim();

    if let Some(inner) = predicate
        .strip_prefix("contains(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let Some((subject, value)) = inner.split_once(',') else {
            return;
        };
        let Some(value) = unquote(value.trim()) else {
            return;
        };
        match subject.trim() {
            "@class" => class_siblings(emitter, value, true),
            "text()" | "." | "normalize-space()" | "normalize-space(.)" => {
                text_siblings(emitter, tag, value, false)
            }
            _ => {}
        }
        return;
    }

    let Some((subject, value)) = predicate.split_once('=') else {
        return;
    };
    if subject.ends_with('!') {
        return;
    }
    let Some(value) = unquote(value.trim()) else {
        return;
    };
    match subject.trim() {
        "@id" => id_siblings(emitter, tag, value),
        "@name" => name_siblings(emitter, tag, value),
        "text()" | "." | "normalize-space()" | "normalize-space(.)"
        | "normalize-space(text())" => text_siblings(emitter, tag, value, true),
        other => {
            if let Some(attr) = other.strip_prefix('@').filter(|a| is_plain_ident(a)) {
                emitter.emit(
                    StrategyKind::Css,
                    css_attr(tag, attr, value),
                    "xpath attribute to css",
                );
            }
        }
    }
}

/// `//tag[predicate]` with exactly one step and one predicate.
fn single_predicate(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("//")?;
    let (tag, predicate) = rest.split_once('[')?;
    if tag != "*" && !is_plain_ident(tag) {
        return None;
    }
    let predicate = predicate.strip_suffix(']')?;
    if predicate.contains("][") {
        return None;
    }
    Some((tag, predicate))
}

fn unquote(value: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            if !inner.contains(quote) {
                return Some(inner);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locators(raw: &str) -> Vec<String> {
        rule_candidates(&Locator::parse(raw))
            .into_iter()
            .map(|candidate| candidate.locator)
            .collect()
    }

    #[test]
    fn id_locator_yields_css_and_xpath() {
        assert_eq!(
            locators("id=login-btn"),
            vec!["css=#login-btn", "xpath=//*[@id='login-btn']"]
        );
        assert_eq!(
            locators("id=2fa"),
            vec!["css=[id='2fa']", "xpath=//*[@id='2fa']"]
        );
    }

    #[test]
    fn css_shapes() {
        assert_eq!(
            locators("css=#submit"),
            vec!["id=submit", "xpath=//*[@id='submit']"]
        );
        assert_eq!(
            locators("css=.primary"),
            vec!["class_name=primary", "xpath=//*[contains(@class,'primary')]"]
        );
        assert_eq!(
            locators("css=input[name='email']"),
            vec!["xpath=//input[@name='email']", "name=email"]
        );
        assert_eq!(
            locators("css=button#go"),
            vec!["id=go", "xpath=//button[@id='go']"]
        );
        assert!(locators("css=div > span:first-child").is_empty());
    }

    #[test]
    fn xpath_shapes() {
        assert_eq!(
            locators("xpath=//*[@id='submit']"),
            vec!["id=submit", "css=#submit"]
        );
        assert_eq!(
            locators("xpath=//input[@name='q']"),
            vec!["name=q", "css=input[name='q']"]
        );
        assert_eq!(
            locators("xpath=//a[text()='Forgot password?']"),
            vec![
                "link_text=Forgot password?",
                "xpath=//*[normalize-space()='Forgot password?']"
            ]
        );
        assert_eq!(
            locators("xpath=//button[@data-testid='save']"),
            vec!["css=button[data-testid='save']"]
        );
        assert!(locators("xpath=/html/body/div[2]/button").is_empty());
    }

    #[test]
    fn text_and_link_shapes() {
        assert_eq!(
            locators("link_text=Help"),
            vec!["partial_link_text=Help", "xpath=//a[normalize-space()='Help']"]
        );
        assert_eq!(locators("class_name=btn"), vec!["css=.btn", "xpath=//*[contains(@class,'btn')]"]);
        assert_eq!(locators("tag_name=form"), vec!["css=form"]);
        assert_eq!(
            locators("Log In"),
            vec!["xpath=//*[normalize-space()='Log In']", "link_text=Log In"]
        );
    }

    #[test]
    fn rule_candidates_carry_fixed_confidence() {
        let candidates = rule_candidates(&Locator::parse("name=email"));
        assert!(candidates.iter().all(|c| c.confidence == RULE_CONFIDENCE));
        assert!(candidates
            .iter()
            .all(|c| c.stability_score == c.strategy.default_stability()));
        assert!(candidates
            .iter()
            .all(|c| c.source == CandidateSource::RulePattern));
    }
}

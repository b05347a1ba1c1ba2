//! Live-session validator backed by a parsed document, for offline healing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use dom_snapshot::{resolve, Document};
use heal_core_types::{HealError, Locator, StrategyKind};
use structural_fallback::extract;

use crate::model::ValidationResult;
use crate::ports::{LiveSession, LiveSessionPort};

pub const UNIQUE_MATCH_CONFIDENCE: f64 = 1.0;
pub const AMBIGUOUS_MATCH_CONFIDENCE: f64 = 0.7;

/// Serves one document for every URL, or per-URL documents when registered.
pub struct SnapshotSessionPort {
    default: Option<Arc<Document>>,
    pages: HashMap<String, Arc<Document>>,
    open: Arc<AtomicUsize>,
}

impl SnapshotSessionPort {
    pub fn new(document: Document) -> Self {
        Self {
            default: Some(Arc::new(document)),
            pages: HashMap::new(),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Port with no fallback document; only registered pages can be opened.
    pub fn empty() -> Self {
        Self {
            default: None,
            pages: HashMap::new(),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_page(mut self, url: impl Into<String>, document: Document) -> Self {
        self.pages.insert(url.into(), Arc::new(document));
        self
    }

    /// Sessions opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveSessionPort for SnapshotSessionPort {
    async fn open(&self, url: &str) -> Result<Box<dyn LiveSession>, HealError> {
        let document = self
            .pages
            .get(url)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| HealError::new(format!("no snapshot for {url}")))?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SnapshotSession {
            document,
            open: self.open.clone(),
        }))
    }
}

struct SnapshotSession {
    document: Arc<Document>,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveSession for SnapshotSession {
    async fn validate_locator(
        &self,
        locator: &str,
        _strategy: StrategyKind,
        expected_tag: Option<&str>,
    ) -> Result<ValidationResult, HealError> {
        Ok(validate_in_document(&self.document, locator, expected_tag))
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolve `locator` in `document` and judge the first match.
pub fn validate_in_document(
    document: &Document,
    locator: &str,
    expected_tag: Option<&str>,
) -> ValidationResult {
    let found = match resolve(document, &Locator::parse(locator)) {
        Ok(found) => found,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };
    let Some(first) = found.first().copied() else {
        return ValidationResult::invalid("element not found");
    };
    let element = extract(document, first);
    let matches_expected_type =
        expected_tag.map_or(true, |tag| tag.eq_ignore_ascii_case(&element.tag));
    let confidence_score = if found.len() == 1 {
        UNIQUE_MATCH_CONFIDENCE
    } else {
        AMBIGUOUS_MATCH_CONFIDENCE
    };
    ValidationResult {
        is_valid: matches_expected_type,
        element_found: true,
        is_interactable: element.is_clickable || element.is_input,
        matches_expected_type,
        confidence_score,
        error_message: (!matches_expected_type).then(|| {
            format!(
                "expected <{}> but found <{}>",
                expected_tag.unwrap_or_default(),
                element.tag
            )
        }),
    }
}

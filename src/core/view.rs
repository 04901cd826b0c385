//! Page view contract
//!
//! The pipeline only needs a handful of operations on a few identified
//! elements: existence checks, show/hide, enable/disable, text content, and
//! replacing the children of the results container. Styling is not its
//! concern. Hosts implement [`PageView`] over their DOM; tests use
//! [`mocks::MockPageView`].

use std::fmt;

use num_enum::TryFromPrimitive;

// =============================================================================
// ELEMENTS AND INTENTS
// =============================================================================

/// Elements the pipeline reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    ScanButton,
    PsaOverlay,
    PsaCountdown,
    ScanningIndicator,
    MonetizationOverlay,
    MonetizationCountdown,
    ViewResultsButton,
    ResultsContainer,
    ErrorPanel,
    ErrorMessage,
    RetryButton,
}

impl Element {
    /// Conventional DOM id for the element
    pub fn dom_id(self) -> &'static str {
        match self {
            Element::ScanButton => "scan-ticket-btn",
            Element::PsaOverlay => "psa-overlay",
            Element::PsaCountdown => "psa-countdown",
            Element::ScanningIndicator => "scanning-indicator",
            Element::MonetizationOverlay => "ad-overlay",
            Element::MonetizationCountdown => "ad-countdown",
            Element::ViewResultsButton => "view-results-btn",
            Element::ResultsContainer => "results-container",
            Element::ErrorPanel => "error-panel",
            Element::ErrorMessage => "error-message",
            Element::RetryButton => "retry-btn",
        }
    }
}

/// User intents delivered by the host's listeners
///
/// Hosts bridging from script pass the numeric code; use
/// `UserIntent::try_from(code)` to decode it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum UserIntent {
    StartScan = 1,
    ViewResults = 2,
    Retry = 3,
    PsaContentLoaded = 4,
    AdContentLoaded = 5,
}

/// Listeners attached at mount and detached at unmount
pub const LISTENERS: &[(Element, UserIntent)] = &[
    (Element::ScanButton, UserIntent::StartScan),
    (Element::ViewResultsButton, UserIntent::ViewResults),
    (Element::RetryButton, UserIntent::Retry),
    (Element::PsaOverlay, UserIntent::PsaContentLoaded),
    (Element::MonetizationOverlay, UserIntent::AdContentLoaded),
];

// =============================================================================
// RESULT NODES
// =============================================================================

/// Which draw a number belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallKind {
    Main,
    Bonus,
}

/// A single number on a ticket row or in the draw
///
/// A match is a property of the ball, so re-rendering can never add a second
/// checkmark next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberBall {
    pub value: u32,
    pub kind: BallKind,
    pub matched: bool,
}

/// Content nodes written into the results container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultNode {
    Heading(String),
    Text(String),
    /// Prize or no-prize banner
    Banner { winner: bool, text: String },
    /// A labelled line of numbers
    NumberRow {
        label: String,
        balls: Vec<NumberBall>,
        summary: Option<String>,
    },
    /// Failure message painted in place of results
    Error(String),
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// The element is not present in the page
    MissingElement(Element),
    /// The host failed to apply the mutation
    Host(String),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::MissingElement(el) => write!(f, "Element #{} not found", el.dom_id()),
            ViewError::Host(msg) => write!(f, "Host error: {}", msg),
        }
    }
}

impl std::error::Error for ViewError {}

// =============================================================================
// PAGE VIEW TRAIT
// =============================================================================

/// Mutations the pipeline performs on the page
pub trait PageView {
    fn exists(&self, element: Element) -> bool;

    fn set_visible(&mut self, element: Element, visible: bool) -> Result<(), ViewError>;

    fn set_enabled(&mut self, element: Element, enabled: bool) -> Result<(), ViewError>;

    fn set_text(&mut self, element: Element, text: &str) -> Result<(), ViewError>;

    /// Remove every child of `element`, then append `nodes`
    fn replace_children(&mut self, element: Element, nodes: &[ResultNode])
        -> Result<(), ViewError>;

    /// Lock or restore page scrolling (locked while an overlay is up)
    fn set_scroll_locked(&mut self, locked: bool);

    fn attach_listener(&mut self, element: Element, intent: UserIntent) -> Result<(), ViewError>;

    fn detach_listener(&mut self, element: Element);
}

// =============================================================================
// MOCK IMPLEMENTATIONS FOR TESTING
// =============================================================================


#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;

    #[test]
    fn test_user_intent_from_code() {
        assert_eq!(UserIntent::try_from(1u8).ok(), Some(UserIntent::StartScan));
        assert_eq!(
            UserIntent::try_from(5u8).ok(),
            Some(UserIntent::AdContentLoaded)
        );
        assert!(UserIntent::try_from(0u8).is_err());
        assert!(UserIntent::try_from(42u8).is_err());
    }

    #[test]
    fn test_every_listener_element_is_distinct() {
        let mut seen = std::collections::HashSet::new();
        for (element, _) in LISTENERS {
            assert!(seen.insert(*element), "{:?} bound twice", element);
        }
    }

    #[test]
    fn test_mock_missing_element() {
        let mut view = MockPageView::new();
        view.remove(Element::PsaOverlay);
        assert!(!view.exists(Element::PsaOverlay));
        assert_eq!(
            view.set_visible(Element::PsaOverlay, true),
            Err(ViewError::MissingElement(Element::PsaOverlay))
        );
        assert_eq!(
            ViewError::MissingElement(Element::PsaOverlay).to_string(),
            "Element #psa-overlay not found"
        );
    }

    #[test]
    fn test_mock_replace_children_replaces() {
        let mut view = MockPageView::new();
        let nodes = vec![ResultNode::Heading("A".to_string())];
        view.replace_children(Element::ResultsContainer, &nodes)
            .unwrap();
        view.replace_children(Element::ResultsContainer, &nodes)
            .unwrap();
        assert_eq!(view.children(Element::ResultsContainer), nodes);
        assert_eq!(view.replace_calls, 2);
    }
}

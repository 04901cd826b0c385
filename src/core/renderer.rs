//! Result renderer
//!
//! Turns a [`ScanResult`] into [`ResultNode`]s and writes them into the
//! results container with clear-and-rebuild semantics. The node list is a
//! pure function of the result, so painting the same result again leaves the
//! page exactly as it was.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use tracing::debug;

use crate::core::protocol::{ScanSuccess, TicketRow};
use crate::core::types::{ScanFailure, ScanResult};
use crate::core::view::{BallKind, Element, NumberBall, PageView, ResultNode, ViewError};

// =============================================================================
// ERRORS AND SUMMARY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The results container is not in the page
    MissingContainer,
    /// The page refused the write
    View(ViewError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingContainer => write!(
                f,
                "Results container #{} not found",
                Element::ResultsContainer.dom_id()
            ),
            RenderError::View(e) => write!(f, "Failed to paint results: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::View(e) => Some(e),
            RenderError::MissingContainer => None,
        }
    }
}

impl From<ViewError> for RenderError {
    fn from(e: ViewError) -> Self {
        RenderError::View(e)
    }
}

/// What one paint wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub nodes: usize,
    pub total_matched: u32,
    pub winner: bool,
}

// =============================================================================
// RENDERER
// =============================================================================

pub struct ResultRenderer;

impl ResultRenderer {
    /// Paint `result` into the results container
    pub fn render<V: PageView>(
        result: &ScanResult,
        view: &mut V,
    ) -> Result<RenderSummary, RenderError> {
        if !view.exists(Element::ResultsContainer) {
            return Err(RenderError::MissingContainer);
        }

        let nodes = Self::build_nodes(result);
        view.replace_children(Element::ResultsContainer, &nodes)?;

        let summary = match result {
            ScanResult::Success(s) => RenderSummary {
                nodes: nodes.len(),
                total_matched: s.total_matched,
                winner: s.has_prize,
            },
            ScanResult::Failure(_) => RenderSummary {
                nodes: nodes.len(),
                total_matched: 0,
                winner: false,
            },
        };
        debug!(
            nodes = summary.nodes,
            total_matched = summary.total_matched,
            winner = summary.winner,
            "[RENDER] Results painted"
        );
        Ok(summary)
    }

    /// Full node list for `result`
    pub fn build_nodes(result: &ScanResult) -> Vec<ResultNode> {
        match result {
            ScanResult::Success(success) => success_nodes(success),
            ScanResult::Failure(failure) => failure_nodes(failure),
        }
    }
}

fn success_nodes(s: &ScanSuccess) -> Vec<ResultNode> {
    let mut nodes = vec![ResultNode::Heading(draw_heading(s))];

    let mut draw_balls: Vec<NumberBall> = s
        .winning_numbers
        .iter()
        .map(|&value| NumberBall {
            value,
            kind: BallKind::Main,
            matched: false,
        })
        .collect();
    draw_balls.extend(s.bonus_numbers.iter().map(|&value| NumberBall {
        value,
        kind: BallKind::Bonus,
        matched: false,
    }));
    nodes.push(ResultNode::NumberRow {
        label: "Winning numbers".to_string(),
        balls: draw_balls,
        summary: None,
    });

    for (i, row) in s.ticket_rows.iter().enumerate() {
        nodes.push(ResultNode::NumberRow {
            label: format!("Line {}", i + 1),
            balls: row_balls(row, s),
            summary: Some(row_summary(row)),
        });
    }

    nodes.push(ResultNode::Text(match s.total_matched {
        1 => "1 number matched".to_string(),
        n => format!("{} numbers matched", n),
    }));

    let banner = if s.has_prize {
        let label = s
            .prize_info
            .as_ref()
            .map(|p| p.label())
            .filter(|l| !l.is_empty());
        match label {
            Some(label) => format!("Winner! {}", label),
            None => "Winner!".to_string(),
        }
    } else {
        "No prize this time".to_string()
    };
    nodes.push(ResultNode::Banner {
        winner: s.has_prize,
        text: banner,
    });

    nodes
}

fn failure_nodes(failure: &ScanFailure) -> Vec<ResultNode> {
    vec![
        ResultNode::Heading(failure.kind.headline().to_string()),
        ResultNode::Error(failure.message.clone()),
    ]
}

/// "Powerball - Draw #1234 - January 6, 2024"
fn draw_heading(s: &ScanSuccess) -> String {
    let mut parts = vec![s.lottery_type.clone()];
    if let Some(number) = s.draw_number.as_deref().filter(|n| !n.is_empty()) {
        parts.push(format!("Draw #{}", number));
    }
    if let Some(date) = s.draw_date.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format_draw_date(date));
    }
    parts.join(" - ")
}

/// Format an ISO date (or RFC 3339 timestamp) for display; anything else is
/// shown as sent
fn format_draw_date(raw: &str) -> String {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()));
    match date {
        Some(d) => d.format("%B %-d, %Y").to_string(),
        None => raw.to_string(),
    }
}

fn row_balls(row: &TicketRow, s: &ScanSuccess) -> Vec<NumberBall> {
    let main_count = s.winning_numbers.len();
    let has_bonus_draw = !s.bonus_numbers.is_empty();
    row.numbers
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let bonus_slot = has_bonus_draw && main_count > 0 && i >= main_count;
            if bonus_slot || row.is_bonus_match(value) {
                NumberBall {
                    value,
                    kind: BallKind::Bonus,
                    matched: row.is_bonus_match(value),
                }
            } else {
                NumberBall {
                    value,
                    kind: BallKind::Main,
                    matched: row.is_matched(value),
                }
            }
        })
        .collect()
}

fn row_summary(row: &TicketRow) -> String {
    let main = row.matched_numbers.len();
    let bonus = !row.matched_bonus.is_empty();
    match (main, bonus) {
        (0, false) => "No matches".to_string(),
        (0, true) => "Bonus matched".to_string(),
        (n, false) => format!("{} matched", n),
        (n, true) => format!("{} + bonus matched", n),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::fixtures::{powerball_result, powerball_win};
    use crate::core::types::FailureKind;
    use crate::core::view::mocks::MockPageView;

    #[test]
    fn test_heading_formats_draw_date() {
        let nodes = ResultRenderer::build_nodes(&powerball_result());
        assert_eq!(
            nodes[0],
            ResultNode::Heading("Powerball - Draw #1234 - January 6, 2024".to_string())
        );
    }

    #[test]
    fn test_unparseable_date_is_kept_verbatim() {
        assert_eq!(format_draw_date("Sat 6 Jan"), "Sat 6 Jan");
        assert_eq!(format_draw_date("2024-03-09T20:59:00-05:00"), "March 9, 2024");
    }

    #[test]
    fn test_matches_are_flags_on_balls() {
        let nodes = ResultRenderer::build_nodes(&powerball_result());
        let ResultNode::NumberRow { label, balls, summary } = &nodes[2] else {
            panic!("expected first ticket row, got {:?}", nodes[2]);
        };
        assert_eq!(label, "Line 1");
        assert_eq!(balls.len(), 6);
        let matched: Vec<u32> = balls.iter().filter(|b| b.matched).map(|b| b.value).collect();
        assert_eq!(matched, vec![3, 14, 9]);
        assert_eq!(balls[5].kind, BallKind::Bonus);
        assert_eq!(balls[0].kind, BallKind::Main);
        assert_eq!(summary.as_deref(), Some("2 + bonus matched"));

        let ResultNode::NumberRow { summary, .. } = &nodes[3] else {
            panic!("expected second ticket row");
        };
        assert_eq!(summary.as_deref(), Some("No matches"));
    }

    #[test]
    fn test_summary_and_prize_banner() {
        let nodes = ResultRenderer::build_nodes(&powerball_result());
        assert!(nodes.contains(&ResultNode::Text("3 numbers matched".to_string())));
        assert_eq!(
            nodes.last(),
            Some(&ResultNode::Banner {
                winner: true,
                text: "Winner! Match 2 + PB - $7".to_string()
            })
        );

        let mut losing = powerball_win();
        losing.has_prize = false;
        losing.prize_info = None;
        losing.total_matched = 1;
        let nodes = ResultRenderer::build_nodes(&ScanResult::Success(losing));
        assert!(nodes.contains(&ResultNode::Text("1 number matched".to_string())));
        assert_eq!(
            nodes.last(),
            Some(&ResultNode::Banner {
                winner: false,
                text: "No prize this time".to_string()
            })
        );
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut view = MockPageView::new();
        let result = powerball_result();

        let first = ResultRenderer::render(&result, &mut view).unwrap();
        let after_first = view.children(Element::ResultsContainer);
        let second = ResultRenderer::render(&result, &mut view).unwrap();

        assert_eq!(first, second);
        assert_eq!(view.children(Element::ResultsContainer), after_first);
        assert_eq!(after_first.len(), first.nodes);
        assert!(first.winner);
    }

    #[test]
    fn test_failure_renders_error_node() {
        let mut view = MockPageView::new();
        let result = ScanResult::Failure(ScanFailure::new(FailureKind::ServerError, "OCR failed"));
        let summary = ResultRenderer::render(&result, &mut view).unwrap();
        assert!(!summary.winner);
        assert_eq!(
            view.children(Element::ResultsContainer).last(),
            Some(&ResultNode::Error("OCR failed".to_string()))
        );
    }

    #[test]
    fn test_missing_container_is_render_error() {
        let mut view = MockPageView::new();
        view.remove(Element::ResultsContainer);
        assert_eq!(
            ResultRenderer::render(&powerball_result(), &mut view),
            Err(RenderError::MissingContainer)
        );
    }

    #[test]
    fn test_host_failure_is_render_error() {
        let mut view = MockPageView::new();
        view.fail_replace = true;
        let err = ResultRenderer::render(&powerball_result(), &mut view).unwrap_err();
        assert!(matches!(err, RenderError::View(ViewError::Host(_))));
    }
}

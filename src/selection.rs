/// Text-selection tracking for the "quote" affordance.
///
/// The TUI reports every change of the transcript selection here. A
/// non-empty selection captures its text and anchors a floating "Quote"
/// button just above it; confirming hands the text over as the pending
/// quote. Collapsing the selection hides the button but never touches a
/// quote that was already confirmed.
use unicode_width::UnicodeWidthStr;

/// Label of the floating button.
pub const AFFORDANCE_LABEL: &str = " ❝ Quote ";

/// Screen rectangle covered by a selection, in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionBounds {
    pub top: u16,
    pub left: u16,
    pub width: u16,
    pub height: u16,
}

impl SelectionBounds {
    fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where the floating button is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub top: u16,
    pub left: u16,
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    captured: Option<String>,
    anchor: Option<Anchor>,
}

impl SelectionTracker {
    pub fn observe(&mut self, text: &str, bounds: SelectionBounds) {
        if text.trim().is_empty() {
            self.collapse();
            return;
        }
        // Zero-size geometry has nothing to anchor to; keep whatever we had.
        if bounds.is_degenerate() {
            return;
        }
        self.captured = Some(text.to_string());
        self.anchor = Some(anchor_for(bounds));
    }

    pub fn collapse(&mut self) {
        self.captured = None;
        self.anchor = None;
    }

    /// Take the captured text and clear the live selection.
    pub fn confirm(&mut self) -> Option<String> {
        self.anchor = None;
        self.captured.take()
    }

    pub fn affordance(&self) -> Option<Anchor> {
        self.anchor
    }

    pub fn captured(&self) -> Option<&str> {
        self.captured.as_deref()
    }
}

/// One row above the selection, centred on it.
fn anchor_for(bounds: SelectionBounds) -> Anchor {
    let half_label = (AFFORDANCE_LABEL.width() / 2) as u16;
    Anchor {
        top: bounds.top.saturating_sub(1),
        left: (bounds.left + bounds.width / 2).saturating_sub(half_label),
    }
}

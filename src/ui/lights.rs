use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

const LIT: &str = "●";
const DARK: &str = "○";

/// Whether light `n` (1-based) is on at `stage`.
///
/// Lights come on one per stage and all go out together on release.
pub fn is_lit(n: u8, stage: u8, stage_count: u8) -> bool {
    stage >= n && stage <= stage_count
}

pub fn lights_line(stage: u8, stage_count: u8) -> Line<'static> {
    let lit = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
    let dark = Style::default().fg(Color::DarkGray);

    let mut spans = Vec::with_capacity(stage_count as usize * 2);
    for n in 1..=stage_count {
        if n > 1 {
            spans.push(Span::raw("  "));
        }
        if is_lit(n, stage, stage_count) {
            spans.push(Span::styled(LIT, lit));
        } else {
            spans.push(Span::styled(DARK, dark));
        }
    }
    Line::from(spans)
}

pub mod charting;
pub mod lights;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
    Frame,
};

use crate::{
    app::{App, BannerKind},
    clock::Clock,
    countdown::ReleaseDelay,
    format::{format_seconds, format_time},
    session::Phase,
};

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;

pub fn draw<C: Clock, D: ReleaseDelay>(app: &App<C, D>, f: &mut Frame) {
    f.render_widget(app, f.area());
}

impl<C: Clock, D: ReleaseDelay> Widget for &App<C, D> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1),
                Constraint::Length(1), // lights
                Constraint::Length(1),
                Constraint::Length(1), // timer
                Constraint::Length(1), // status
                Constraint::Length(1), // banner
                Constraint::Min(3),    // history
                Constraint::Length(1), // summary
                Constraint::Length(1), // help
            ])
            .split(area);

        let who = match &self.identity {
            Some(user) => format!("signed in as {user}"),
            None => "not signed in".to_string(),
        };
        Paragraph::new(Line::from(vec![
            Span::styled("LIGHTS ", bold_style),
            Span::styled("OUT", bold_style.fg(Color::Red)),
            Span::styled(format!("   {who}"), dim_style),
        ]))
        .render(chunks[0], buf);

        let session = &self.session;
        Paragraph::new(lights::lights_line(
            session.stage_index(),
            session.stage_count(),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        let timer_style = match session.phase() {
            Phase::Running => bold_style.fg(Color::White),
            Phase::Arming => bold_style.fg(Color::DarkGray),
            Phase::Idle => bold_style,
        };
        Paragraph::new(Span::styled(format_time(session.elapsed_ms()), timer_style))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
        self.timer_area.set(chunks[4].union(chunks[5]));

        let status_style = match session.phase() {
            Phase::Arming => bold_style.fg(Color::Yellow),
            Phase::Running => bold_style.fg(Color::Red),
            Phase::Idle if session.elapsed_ms() > 0 => Style::default().fg(Color::Green),
            Phase::Idle => dim_style,
        };
        Paragraph::new(Span::styled(self.status_line(), status_style))
            .alignment(Alignment::Center)
            .render(chunks[5], buf);

        if let Some(banner) = &self.banner {
            let color = match banner.kind {
                BannerKind::Identity => Color::Yellow,
                BannerKind::StoreRead | BannerKind::StoreWrite => Color::Red,
            };
            Paragraph::new(Span::styled(banner.message.as_str(), bold_style.fg(color)))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .render(chunks[6], buf);
        }

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(24), Constraint::Min(10)])
            .split(chunks[7]);
        render_recent(self, body[0], buf);
        render_trend(self, body[1], buf);

        let summary = match self.history.summary() {
            Some(s) => {
                let mut text = format!(
                    "best {}   mean {}   sd {:.2}s",
                    format_time(s.best_ms),
                    format_time(s.mean_ms.round() as u64),
                    s.std_dev_ms / 1000.0
                );
                if let Some(ao5) = s.ao5_ms {
                    text.push_str(&format!("   ao5 {}", format_time(ao5.round() as u64)));
                }
                text
            }
            None => String::new(),
        };
        Paragraph::new(Span::styled(summary, Style::default().fg(Color::Cyan)))
            .alignment(Alignment::Center)
            .render(chunks[8], buf);

        let help = if self.confirm_clear {
            Span::styled(
                "Delete ALL saved times? This cannot be undone. (y)es / any other key to cancel",
                bold_style.fg(Color::Red),
            )
        } else {
            Span::styled(
                match session.phase() {
                    Phase::Arming => "(esc) false start",
                    Phase::Running => "(space) stop",
                    Phase::Idle => "(space) start / (c)lear history / (q)uit",
                },
                italic_style,
            )
        };
        Paragraph::new(help).render(chunks[9], buf);
    }
}

fn render_recent<C: Clock, D: ReleaseDelay>(app: &App<C, D>, area: Rect, buf: &mut Buffer) {
    let pending_style = Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC);
    let time_style = Style::default().fg(Color::Yellow);

    let mut lines: Vec<Line> = app
        .history
        .list
        .iter()
        .enumerate()
        .map(|(i, solve)| {
            let mut spans = vec![
                Span::raw(format!("{:>2}. ", i + 1)),
                Span::styled(format_seconds(solve.elapsed_ms), time_style),
            ];
            if solve.is_pending() {
                spans.push(Span::styled(" saving", pending_style));
            }
            Line::from(spans)
        })
        .collect();

    if lines.is_empty() {
        lines.push(Line::from(Span::styled("no solves yet", pending_style)));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Recent"))
        .render(area, buf);
}

fn render_trend<C: Clock, D: ReleaseDelay>(app: &App<C, D>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let points = app.history.trend_points();
    let (x_max, y_max) = charting::compute_chart_params(&points);

    let datasets = vec![Dataset::default()
        .marker(ratatui::symbols::Marker::Braille)
        .style(Style::default().fg(Color::Magenta))
        .graph_type(GraphType::Line)
        .data(&points)];

    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title("Trend"))
        .x_axis(
            Axis::default()
                .title("solve")
                .bounds([1.0, x_max])
                .labels(vec![
                    Span::styled("1", bold_style),
                    Span::styled(charting::format_label(x_max), bold_style),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("sec")
                .bounds([0.0, y_max])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(charting::format_label(y_max), bold_style),
                ]),
        )
        .render(area, buf);
}

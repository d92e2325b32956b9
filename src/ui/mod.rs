use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, AuthField, AuthView, DraftField};
use crate::config::ThemeName;

const CURSOR_GLYPH: char = '▌';

struct Palette {
    accent: Color,
    muted: Color,
    error: Color,
    notice: Color,
    highlight_bg: Color,
    highlight_fg: Color,
}

fn palette(theme: &ThemeName) -> Palette {
    match theme {
        ThemeName::Dark => Palette {
            accent: Color::Cyan,
            muted: Color::Gray,
            error: Color::Red,
            notice: Color::Green,
            highlight_bg: Color::Blue,
            highlight_fg: Color::Black,
        },
        ThemeName::Light => Palette {
            accent: Color::Blue,
            muted: Color::DarkGray,
            error: Color::Red,
            notice: Color::Green,
            highlight_bg: Color::Cyan,
            highlight_fg: Color::Black,
        },
        ThemeName::HighContrast => Palette {
            accent: Color::White,
            muted: Color::White,
            error: Color::LightRed,
            notice: Color::LightGreen,
            highlight_bg: Color::White,
            highlight_fg: Color::Black,
        },
        ThemeName::Solarized => Palette {
            accent: Color::LightBlue,
            muted: Color::Gray,
            error: Color::LightRed,
            notice: Color::LightGreen,
            highlight_bg: Color::LightYellow,
            highlight_fg: Color::Black,
        },
    }
}

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    list_state: &mut ListState,
    theme: &ThemeName,
) {
    let palette = palette(theme);
    if !state.is_authenticated() {
        draw_auth_card(frame, state, &palette);
        return;
    }

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(vertical[0]);

    draw_note_list(frame, state, list_state, &palette, columns[0]);
    draw_main_pane(frame, state, &palette, columns[1]);

    let status = build_status_line(state, &palette);
    let status_paragraph = Paragraph::new(status).style(Style::default().fg(palette.muted));
    frame.render_widget(status_paragraph, vertical[1]);

    render_delete_overlay(frame, state, &palette);
}

fn draw_auth_card(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let area = centered_rect(54, 60, frame.size());
    frame.render_widget(Clear, area);

    let form = &state.auth.form;
    let heading = match form.view {
        AuthView::Login => "Login",
        AuthView::Register => "Sign Up",
    };

    let mut lines = vec![
        Line::from(Span::styled(
            heading,
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    lines.push(auth_field_line(
        "Username",
        &form.username,
        form.focus == AuthField::Username,
        false,
        palette,
    ));
    lines.push(auth_field_line(
        "Password",
        &form.password,
        form.focus == AuthField::Password,
        true,
        palette,
    ));
    if form.view == AuthView::Register {
        lines.push(auth_field_line(
            "Confirm",
            &form.confirm_password,
            form.focus == AuthField::ConfirmPassword,
            true,
            palette,
        ));
    }
    lines.push(Line::from(""));

    if state.auth.pending {
        lines.push(Line::from(Span::styled(
            "Contacting server…",
            Style::default().fg(palette.muted),
        )));
    } else if let Some(error) = &state.auth.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(palette.error),
        )));
    } else if let Some(notice) = &state.auth.notice {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(palette.notice),
        )));
    } else {
        lines.push(Line::from(""));
    }

    lines.push(Line::from(""));
    let toggle_hint = match form.view {
        AuthView::Login => "Ctrl-t sign up instead",
        AuthView::Register => "Ctrl-t back to login",
    };
    lines.push(Line::from(Span::styled(
        format!("Enter submit • Tab next field • {toggle_hint} • Esc quit"),
        Style::default().fg(palette.muted),
    )));

    let card = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Personal Notes")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(card, area);
}

fn auth_field_line(
    label: &str,
    value: &str,
    focused: bool,
    mask: bool,
    palette: &Palette,
) -> Line<'static> {
    let mut display = if mask {
        "•".repeat(value.graphemes(true).count())
    } else {
        value.to_string()
    };
    if focused {
        display.push(CURSOR_GLYPH);
    }
    let label_style = if focused {
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(palette.muted)
    };
    Line::from(vec![
        Span::styled(format!("{label:>9}: "), label_style),
        Span::raw(display),
    ])
}

fn draw_note_list(
    frame: &mut Frame,
    state: &AppState,
    list_state: &mut ListState,
    palette: &Palette,
    area: Rect,
) {
    let mut items = Vec::with_capacity(state.notes.notes.len());
    let editing_id = state.draft().and_then(|draft| draft.note_id);
    for note in &state.notes.notes {
        let mut title_spans = Vec::new();
        if editing_id == Some(note.id) {
            title_spans.push(Span::styled(
                "✎ ",
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        title_spans.push(Span::styled(
            note.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let mut lines = vec![
            Line::from(title_spans),
            Line::from(Span::styled(
                format!("Updated {}", relative_updated(note.updated_at.as_deref())),
                Style::default().fg(palette.muted),
            )),
        ];
        for preview in preview_lines(&note.content, state.preview_lines, area.width) {
            lines.push(Line::from(Span::styled(
                preview,
                Style::default().fg(palette.muted),
            )));
        }
        items.push(ListItem::new(lines));
    }
    if items.is_empty() {
        let hint = if state.notes.loading {
            "Loading notes…"
        } else if state.notes.query.is_empty() {
            "No notes yet. Press `a` to create one."
        } else {
            "No matching notes."
        };
        items.push(ListItem::new(hint));
    }

    let title = if state.notes.loading {
        "Notes (loading…)"
    } else {
        "Notes"
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .highlight_style(
            Style::default()
                .bg(palette.highlight_bg)
                .fg(palette.highlight_fg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn draw_main_pane(frame: &mut Frame, state: &AppState, palette: &Palette, area: Rect) {
    if let Some(draft) = state.draft() {
        let heading = if draft.note_id.is_some() {
            "Edit Note"
        } else {
            "New Note"
        };
        let mut lines = Vec::new();
        if let Some(error) = &state.notes.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(palette.error),
            )));
        }
        let mut title_display = draft.title.clone();
        if draft.focus == DraftField::Title {
            title_display.push(CURSOR_GLYPH);
        }
        lines.push(Line::from(vec![
            Span::styled(
                "Title: ",
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(title_display),
        ]));
        lines.push(Line::from(Span::styled(
            "─".repeat(area.width.saturating_sub(2) as usize),
            Style::default().fg(palette.muted),
        )));
        let content_offset = lines.len() as u16;
        for line in draft.content.split('\n') {
            lines.push(Line::from(line.to_string()));
        }

        let title = if draft.is_saving() {
            format!("{heading} (saving…)")
        } else if draft.is_dirty() {
            format!("{heading} *")
        } else {
            heading.to_string()
        };
        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        );
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);

        if draft.focus == DraftField::Content {
            if let Some((x, y)) =
                content_cursor_position(&draft.content, draft.cursor(), area, content_offset)
            {
                frame.set_cursor(x, y);
            }
        }
        return;
    }

    let text: Text = match state.selected_note() {
        Some(note) => {
            let mut lines = Vec::new();
            if let Some(error) = &state.notes.error {
                lines.push(Line::from(Span::styled(
                    error.clone(),
                    Style::default().fg(palette.error),
                )));
            }
            lines.push(Line::from(Span::styled(
                note.title.clone(),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(Span::styled(
                format!(
                    "Last updated: {}",
                    relative_updated(note.updated_at.as_deref())
                ),
                Style::default().fg(palette.muted),
            )));
            lines.push(Line::from(""));
            if note.content.is_empty() {
                lines.push(Line::from(Span::styled(
                    "(empty note)",
                    Style::default().fg(palette.muted),
                )));
            } else {
                for line in note.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Text::from(lines)
        }
        None => {
            let mut lines = Vec::new();
            if let Some(error) = &state.notes.error {
                lines.push(Line::from(Span::styled(
                    error.clone(),
                    Style::default().fg(palette.error),
                )));
            }
            let hint = if state.notes.notes.is_empty() {
                "No notes to show"
            } else {
                "Select a note to view it"
            };
            lines.push(Line::from(Span::styled(
                hint,
                Style::default().fg(palette.muted),
            )));
            Text::from(lines)
        }
    };

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title("Note")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn build_status_line(state: &AppState, palette: &Palette) -> Text<'static> {
    let total = state.notes.notes.len();
    let position = match state.selected_index() {
        Some(idx) => format!("{}/{}", idx + 1, total),
        None => format!("-/{total}"),
    };

    let mut spans = vec![
        Span::raw(format!("Notes: {total}")),
        Span::raw(" | "),
        Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
    ];

    if let Some(user) = &state.auth.user {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            user.username.clone(),
            Style::default().fg(palette.accent),
        ));
    }

    if state.notes.search_active || !state.notes.query.is_empty() {
        let label_style = if state.notes.search_active {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        spans.push(Span::raw(" | Search "));
        spans.push(Span::styled("/", label_style));
        if state.notes.query.is_empty() {
            spans.push(Span::styled(
                "(type to search)",
                Style::default().fg(Color::DarkGray),
            ));
        } else {
            spans.push(Span::styled(
                state.notes.query.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        if state.notes.search_active {
            spans.push(Span::styled(
                CURSOR_GLYPH.to_string(),
                Style::default().fg(palette.accent),
            ));
        }
    }

    if state.notes.loading {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            "loading",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }

    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(palette.accent),
        ));
    }

    let mut lines = Vec::with_capacity(3);
    lines.push(Line::from(spans));
    lines.push(Line::from(Span::styled(
        "Keys: j/k move • a new • e edit • d delete • / search • Ctrl-r refresh",
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(Span::styled(
        "      Tab field • Ctrl-s save • Esc cancel • Shift-L logout • q quit",
        Style::default().fg(Color::DarkGray),
    )));
    Text::from(lines)
}

fn render_delete_overlay(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let Some(overlay) = state.delete_overlay() else {
        return;
    };
    let area = centered_rect(60, 30, frame.size());
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            "Delete Note",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Delete '{}' permanently?", overlay.title)),
        Line::from(""),
        Line::from(Span::styled(
            "Enter or y confirm • Esc cancel",
            Style::default().fg(palette.muted),
        )),
    ])
    .block(
        Block::default()
            .title(format!("Confirm Delete (#{})", overlay.note_id))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.error)),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

/// Terminal cursor position for the draft content area. The edit pane
/// renders unwrapped, so rows and columns map straight onto the text.
fn content_cursor_position(
    content: &str,
    cursor: usize,
    area: Rect,
    content_offset: u16,
) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    if inner_width == 0 || inner_height == 0 {
        return None;
    }

    let cursor = cursor.min(content.len());
    let mut row = 0u16;
    let mut col = 0u16;
    for grapheme in content[..cursor].graphemes(true) {
        if grapheme == "\n" {
            row += 1;
            col = 0;
        } else {
            col += UnicodeWidthStr::width(grapheme) as u16;
        }
    }

    let row = (content_offset + row).min(inner_height.saturating_sub(1));
    let col = col.min(inner_width.saturating_sub(1));
    Some((area.x + 1 + col, area.y + 1 + row))
}

fn preview_lines(content: &str, max_lines: usize, width: u16) -> Vec<String> {
    let max_cols = width.saturating_sub(4) as usize;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(max_lines)
        .map(|line| truncate_to_width(line.trim_end(), max_cols))
        .collect()
}

fn truncate_to_width(text: &str, max_cols: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_cols {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for grapheme in text.graphemes(true) {
        let glyph = UnicodeWidthStr::width(grapheme);
        if used + glyph + 1 > max_cols {
            break;
        }
        out.push_str(grapheme);
        used += glyph;
    }
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}

fn relative_updated(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "unknown".to_string();
    };
    let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) else {
        return raw.to_string();
    };
    let diff = OffsetDateTime::now_utc() - parsed;
    if diff.is_negative() || diff < Duration::seconds(45) {
        return "just now".to_string();
    }
    if diff < Duration::minutes(90) {
        return format!("{}m ago", diff.whole_minutes().max(1));
    }
    if diff < Duration::hours(36) {
        return format!("{}h ago", diff.whole_hours().max(1));
    }
    if diff < Duration::days(10) {
        return format!("{}d ago", diff.whole_days().max(1));
    }
    parsed
        .format(&Rfc3339)
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_display_width() {
        let truncated = truncate_to_width("a very long preview line indeed", 10);
        assert!(truncated.ends_with('…'));
        assert!(UnicodeWidthStr::width(truncated.as_str()) <= 10);
    }

    #[test]
    fn short_lines_are_left_alone() {
        assert_eq!(truncate_to_width("short", 20), "short");
    }

    #[test]
    fn relative_updated_handles_missing_and_bogus_timestamps() {
        assert_eq!(relative_updated(None), "unknown");
        assert_eq!(relative_updated(Some("not-a-date")), "not-a-date");
    }

    #[test]
    fn relative_updated_reports_recent_times_as_just_now() {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .expect("formatting now");
        assert_eq!(relative_updated(Some(&now)), "just now");
    }

    #[test]
    fn preview_skips_blank_lines() {
        let lines = preview_lines("first\n\n  \nsecond\nthird", 2, 40);
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn cursor_position_tracks_rows_and_columns() {
        let area = Rect::new(0, 0, 40, 20);
        let content = "abc\ndef";
        // cursor after 'd' (byte 5): row 1, col 1
        let (x, y) = content_cursor_position(content, 5, area, 2).expect("position");
        assert_eq!((x, y), (1 + 1, 2 + 1 + 1));
    }
}

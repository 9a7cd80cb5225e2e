use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use crm_shared::{ActivityType, TaskPriority};
use unicode_width::UnicodeWidthStr;

use crate::associate::{AssociatePanel, AssociationChanges};
use crate::calendar::DatePicker;
use crate::config::Config;
use crate::datetime::{format_date_peru, format_date_time_peru};
use crate::deal::{DealDetail, Notice, NoticeKind};
use crate::feed::FeedItem;

const PREVIEW_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn print_dates(&mut self, date: &str, date_time: &str, input: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "date      {date}")?;
        writeln!(out, "datetime  {date_time}")?;
        writeln!(out, "input     {input}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, picker))]
    pub fn print_calendar(&mut self, picker: &DatePicker) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let body = calendar_lines(picker, |text, code| self.paint(text, code));
        for line in body {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, detail, items))]
    pub fn print_deal(&mut self, detail: &DealDetail, items: &[&FeedItem]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let deal = detail.deal();

        writeln!(out, "{}", self.paint(&deal.name, "1"))?;
        writeln!(out, "id        {}", deal.id)?;
        if let Some(stage) = &deal.stage {
            writeln!(out, "stage     {stage}")?;
        }
        if let Some(amount) = deal.amount {
            writeln!(out, "amount    {amount:.2}")?;
        }
        if let Some(close) = &deal.close_date {
            writeln!(out, "closes    {}", format_date_peru(close))?;
        }
        if !deal.companies.is_empty() {
            let names: Vec<_> = deal.companies.iter().map(|c| c.name.as_str()).collect();
            writeln!(out, "companies {}", names.join(", "))?;
        }
        if !deal.contacts.is_empty() {
            let names: Vec<_> = deal.contacts.iter().map(|c| c.full_name()).collect();
            writeln!(out, "contacts  {}", names.join(", "))?;
        }
        let description = detail.description().plain_text();
        if !description.is_empty() {
            writeln!(out, "\n{description}")?;
        }
        writeln!(out)?;

        let headers = vec![
            "Date".to_string(),
            "Type".to_string(),
            "Title".to_string(),
            "Due".to_string(),
            "By".to_string(),
            "Preview".to_string(),
        ];
        let rows = items.iter().map(|item| self.feed_row(item)).collect();
        write_table(&mut out, headers, rows)?;
        writeln!(out, "\n{} of {} items", items.len(), detail.feed().len())?;
        Ok(())
    }

    pub fn print_saved(&mut self, item: &FeedItem) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "Created {} {}: {}",
            kind_label(item.kind),
            self.paint(&item.id.to_string(), "33"),
            item.title
        )?;
        if let Some(due) = &item.due_date {
            writeln!(out, "due       {}", format_date_peru(due))?;
        }
        Ok(())
    }

    pub fn print_notice(&mut self, notice: &Notice) -> anyhow::Result<()> {
        let code = match notice.kind {
            NoticeKind::Success => "32",
            NoticeKind::Error => "31",
        };
        writeln!(io::stdout().lock(), "{}", self.paint(&notice.message, code))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, panel))]
    pub fn print_candidates(&mut self, panel: &AssociatePanel) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            " ".to_string(),
            "ID".to_string(),
            panel.kind().to_string(),
            "Detail".to_string(),
        ];
        let rows = panel
            .candidates()
            .iter()
            .map(|candidate| {
                let mark = if panel.is_checked(candidate.id) { "[x]" } else { "[ ]" };
                vec![
                    mark.to_string(),
                    self.paint(&candidate.id.to_string(), "33"),
                    candidate.label.clone(),
                    candidate.detail.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_changes(&mut self, changes: &AssociationChanges) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if changes.is_empty() {
            writeln!(out, "No changes.")?;
            return Ok(());
        }
        let join = |ids: &[u64]| ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", ");
        writeln!(out, "add       {}", join(&changes.added))?;
        writeln!(out, "remove    {}", join(&changes.removed))?;
        writeln!(
            out,
            "{}",
            self.paint("Association changes are not saved to the server yet.", "33")
        )?;
        Ok(())
    }

    fn feed_row(&self, item: &FeedItem) -> Vec<String> {
        let created = item
            .created_at
            .map(|at| format_date_time_peru(at))
            .unwrap_or_default();
        let mut kind = kind_label(item.kind).to_string();
        if let Some(priority) = item.priority {
            kind = format!("{kind} ({})", priority_label(priority));
        }
        let kind = if item.is_task {
            self.paint(&kind, "36")
        } else {
            kind
        };
        let due = item
            .due_date
            .as_deref()
            .map(|due| format_date_peru(due))
            .unwrap_or_default();
        vec![
            created,
            kind,
            item.title.clone(),
            due,
            item.author.clone().unwrap_or_default(),
            preview(&item.description_html),
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn kind_label(kind: ActivityType) -> &'static str {
    match kind {
        ActivityType::Note => "note",
        ActivityType::Email => "email",
        ActivityType::Call => "call",
        ActivityType::Meeting => "meeting",
        ActivityType::Task => "task",
    }
}

fn priority_label(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Low => "low",
        TaskPriority::Medium => "medium",
        TaskPriority::High => "high",
        TaskPriority::Urgent => "urgent",
    }
}

/// First line of an HTML description as
/// plain text, cut to the preview width.
pub fn preview(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let text = match html2text::from_read(html.as_bytes(), PREVIEW_WIDTH * 4) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(error = %err, "html preview failed; using raw text");
            html.to_string()
        }
    };
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    truncate_to_width(line, PREVIEW_WIDTH)
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

/// Title, weekday header and six rows of
/// day numbers. Today is highlighted and
/// the selected day bracketed.
pub fn calendar_lines(picker: &DatePicker, paint: impl Fn(&str, &str) -> String) -> Vec<String> {
    let mut lines = vec![format!("{:^28}", picker.title())];
    lines.push(
        picker
            .weekday_labels()
            .iter()
            .map(|label| format!("{label:^4}"))
            .collect::<String>(),
    );

    for week in picker.grid().chunks(7) {
        let cells: Vec<String> = week
            .iter()
            .map(|cell| {
                let text = if picker.is_selected(cell) {
                    format!("[{:>2}]", cell.day)
                } else {
                    format!(" {:>2} ", cell.day)
                };
                if !cell.is_current_month {
                    paint(&text, "2")
                } else if picker.is_today(cell) {
                    paint(&text, "1;4")
                } else {
                    text
                }
            })
            .collect();
        lines.push(cells.join(""));
    }
    lines
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn table_pads_by_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["año".to_string(), "x".to_string()]],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "A   B ");
        assert_eq!(lines[2], "año x ");
    }

    #[test]
    fn preview_uses_first_text_line() {
        assert_eq!(preview(""), "");
        assert_eq!(preview("<p>Hola equipo</p><p>más</p>"), "Hola equipo");
    }

    #[test]
    fn calendar_marks_selection() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).expect("date");
        let mut picker = DatePicker::new(today);
        picker.open_at(Some("2024-02-29"));
        let lines = calendar_lines(&picker, |text, _| text.to_string());
        assert_eq!(lines.len(), 8);
        assert!(lines[0].contains("Febrero 2024"));
        assert!(lines.iter().any(|line| line.contains("[29]")));
    }
}

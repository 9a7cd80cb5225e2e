use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::{
  escape,
  resolve_html5_entity,
  unescape_with
};
use quick_xml::events::{
  BytesStart,
  Event
};
use tracing::{
  debug,
  warn
};

use super::document::{
  Align,
  Block,
  Document,
  ListKind,
  Mark,
  Marks,
  Paragraph,
  Run
};

impl Document {
  /// Serialises to the HTML stored in
  /// activity and deal descriptions.
  pub fn to_html(&self) -> String {
    let mut out = String::new();
    let mut open_list: Option<ListKind> =
      None;

    for block in &self.blocks {
      let list = block
        .as_paragraph()
        .and_then(|p| p.list);
      if open_list != list {
        if let Some(kind) = open_list {
          out.push_str(list_close(kind));
        }
        if let Some(kind) = list {
          out.push_str(list_open(kind));
        }
        open_list = list;
      }

      match block {
        | Block::Paragraph(p) => {
          let tag = if p.list.is_some() {
            "li"
          } else {
            "p"
          };
          write_paragraph(&mut out, tag, p);
        }
        | Block::Table { cells } => {
          out.push_str("<table><tbody>");
          for row in cells {
            out.push_str("<tr>");
            for cell in row {
              out.push_str("<td>");
              out.push_str(&escape(
                cell.as_str()
              ));
              out.push_str("</td>");
            }
            out.push_str("</tr>");
          }
          out.push_str("</tbody></table>");
        }
        | Block::Image { src, name } => {
          out.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\"/>",
            escape(src.as_str()),
            escape(name.as_str())
          ));
        }
        | Block::File { href, name } => {
          out.push_str(&format!(
            "<a href=\"{}\" download=\"{}\">{}</a>",
            escape(href.as_str()),
            escape(name.as_str()),
            escape(name.as_str())
          ));
        }
      }
    }

    if let Some(kind) = open_list {
      out.push_str(list_close(kind));
    }
    out
  }

  /// Parses description HTML. Unknown
  /// tags are skipped and unclosed tags
  /// are tolerated. Input that is not
  /// markup at all becomes one paragraph,
  /// and anything after broken markup is
  /// kept as text.
  #[tracing::instrument(skip(html), fields(len = html.len()))]
  pub fn from_html(html: &str) -> Self {
    let trimmed = html.trim();
    if trimmed.is_empty() {
      return Document::new();
    }

    let source = escape_stray_lt(trimmed);
    let mut parser = HtmlParser::default();
    let mut reader = Reader::from_str(&source);
    reader.config_mut().check_end_names =
      false;

    loop {
      match reader.read_event() {
        | Ok(Event::Start(e)) => {
          parser.start(&e, false)
        }
        | Ok(Event::Empty(e)) => {
          parser.start(&e, true)
        }
        | Ok(Event::End(e)) => {
          parser.end(&tag_name(e.name().as_ref()))
        }
        | Ok(Event::Text(e)) => {
          let raw = String::from_utf8_lossy(&e);
          parser.text(&decode_text(&raw))
        }
        | Ok(Event::CData(e)) => {
          parser.text(&String::from_utf8_lossy(&e))
        }
        | Ok(Event::Eof) => break,
        | Ok(_) => {}
        | Err(err) => {
          let at = reader.error_position();
          let rest = usize::try_from(at)
            .ok()
            .and_then(|at| source.get(at..))
            .unwrap_or(&source);
          warn!(
            error = %err,
            position = at,
            "malformed description html; keeping the rest as text"
          );
          parser.text(&decode_text(rest));
          parser.failed = true;
          break;
        }
      }
    }

    let blocks = parser.finish();
    if blocks.is_empty() {
      debug!("no markup recognised; treating description as plain text");
      return Document::from_blocks(vec![
        Block::Paragraph(
          Paragraph::with_runs(vec![
            Run::plain(trimmed)
          ])
        ),
      ]);
    }
    Document::from_blocks(blocks)
  }
}

fn list_open(kind: ListKind) -> &'static str {
  match kind {
    | ListKind::Ordered => "<ol>",
    | ListKind::Unordered => "<ul>"
  }
}

fn list_close(
  kind: ListKind
) -> &'static str {
  match kind {
    | ListKind::Ordered => "</ol>",
    | ListKind::Unordered => "</ul>"
  }
}

fn write_paragraph(
  out: &mut String,
  tag: &str,
  p: &Paragraph
) {
  if p.align == Align::Left {
    out.push_str(&format!("<{tag}>"));
  } else {
    out.push_str(&format!(
      "<{tag} style=\"text-align: {}\">",
      p.align.as_css()
    ));
  }

  if p.is_empty() {
    out.push_str("<br/>");
  }

  for run in &p.runs {
    let mut open = String::new();
    let mut close = String::new();
    if let Some(href) = &run.link {
      open.push_str(&format!(
        "<a href=\"{}\">",
        escape(href.as_str())
      ));
      close.insert_str(0, "</a>");
    }
    for (mark, name) in [
      (Mark::Bold, "strong"),
      (Mark::Italic, "em"),
      (Mark::Underline, "u"),
      (Mark::Strike, "s")
    ] {
      if run.marks.has(mark) {
        open.push_str(&format!("<{name}>"));
        close
          .insert_str(0, &format!("</{name}>"));
      }
    }
    out.push_str(&open);
    out.push_str(&escape(run.text.as_str()));
    out.push_str(&close);
  }

  out.push_str(&format!("</{tag}>"));
}

fn tag_name(raw: &[u8]) -> String {
  String::from_utf8_lossy(raw)
    .to_ascii_lowercase()
}

/// Escapes a `<` that cannot open a tag,
/// as in `monto < 5000`, so the reader
/// sees it as text.
fn escape_stray_lt(html: &str) -> Cow<'_, str> {
  let opens_tag = |rest: &str| {
    let mut chars = rest.chars();
    match chars.next() {
      | Some('!' | '?') => true,
      | Some('/') => chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic()),
      | Some(c) => c.is_ascii_alphabetic(),
      | None => false
    }
  };

  if !html
    .match_indices('<')
    .any(|(at, _)| !opens_tag(&html[at + 1..]))
  {
    return Cow::Borrowed(html);
  }

  let mut out = String::with_capacity(html.len() + 8);
  let mut last = 0;
  for (at, _) in html.match_indices('<') {
    if !opens_tag(&html[at + 1..]) {
      out.push_str(&html[last..at]);
      out.push_str("&lt;");
      last = at + 1;
    }
  }
  out.push_str(&html[last..]);
  Cow::Owned(out)
}

fn html_entity(
  name: &str
) -> Option<&'static str> {
  match name {
    | "nbsp" => Some("\u{a0}"),
    | _ => resolve_html5_entity(name)
  }
}

/// Decodes entity references. One that
/// cannot be resolved stays literal and
/// the rest of the text is still decoded.
fn decode_text(raw: &str) -> String {
  if let Ok(text) = unescape_with(raw, html_entity) {
    return text.into_owned();
  }

  let mut out = String::with_capacity(raw.len());
  let mut rest = raw;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    let candidate = &rest[amp..];
    let reference = candidate
      .find(';')
      .filter(|end| *end <= 32)
      .map(|end| &candidate[..=end]);
    match reference
      .and_then(|r| unescape_with(r, html_entity).ok().map(|text| (r, text)))
    {
      | Some((r, text)) => {
        out.push_str(&text);
        rest = &candidate[r.len()..];
      }
      | None => {
        debug!(text = %candidate.chars().take(12).collect::<String>(), "unknown entity kept literally");
        out.push('&');
        rest = &candidate[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

fn attribute(
  e: &BytesStart<'_>,
  key: &str
) -> Option<String> {
  e.html_attributes().flatten().find_map(
    |attr| {
      if !attr
        .key
        .as_ref()
        .eq_ignore_ascii_case(key.as_bytes())
      {
        return None;
      }
      let raw: Cow<'_, str> =
        String::from_utf8_lossy(&attr.value);
      Some(decode_text(&raw))
    }
  )
}

fn align_from_style(
  e: &BytesStart<'_>
) -> Align {
  attribute(e, "style")
    .and_then(|style| {
      style.split(';').find_map(|decl| {
        let (prop, value) =
          decl.split_once(':')?;
        if prop.trim().eq_ignore_ascii_case(
          "text-align"
        ) {
          Align::from_css(value)
        } else {
          None
        }
      })
    })
    .or_else(|| {
      attribute(e, "align")
        .and_then(|value| {
          Align::from_css(&value)
        })
    })
    .unwrap_or_default()
}

#[derive(Debug)]
struct StyleFrame {
  tag:   String,
  mark:  Option<Mark>,
  link:  Option<String>
}

#[derive(Debug, Default)]
struct PendingFile {
  href: String,
  name: String,
  text: String
}

#[derive(Debug, Default)]
struct TableBuilder {
  rows:    Vec<Vec<String>>,
  in_cell: bool
}

#[derive(Debug, Default)]
struct HtmlParser {
  blocks:  Vec<Block>,
  current: Option<(Paragraph, bool)>,
  frames:  Vec<StyleFrame>,
  lists:   Vec<ListKind>,
  table:   Option<TableBuilder>,
  file:    Option<PendingFile>,
  failed:  bool
}

impl HtmlParser {
  fn start(
    &mut self,
    e: &BytesStart<'_>,
    empty: bool
  ) {
    let name = tag_name(e.name().as_ref());
    match name.as_str() {
      | "p" | "div" | "h1" | "h2" | "h3"
      | "h4" | "h5" | "h6"
      | "blockquote" => {
        self.flush();
        let align = align_from_style(e);
        self.open_paragraph(align, None);
        if empty {
          self.flush();
        }
      }
      | "li" => {
        self.flush();
        let align = align_from_style(e);
        let list = self
          .lists
          .last()
          .copied()
          .or(Some(ListKind::Unordered));
        self.open_paragraph(align, list);
        if empty {
          self.flush();
        }
      }
      | "ul" | "ol" if !empty => {
        self.flush();
        self.lists.push(if name == "ol" {
          ListKind::Ordered
        } else {
          ListKind::Unordered
        });
      }
      | "br" => self.line_break(),
      | "img" => {
        self.flush_if_content();
        let src = attribute(e, "src")
          .unwrap_or_default();
        if !src.is_empty() {
          let name = attribute(e, "alt")
            .unwrap_or_default();
          self
            .blocks
            .push(Block::Image { src, name });
        }
      }
      | "table" if !empty => {
        self.flush();
        self.table =
          Some(TableBuilder::default());
      }
      | "tr" => {
        if let Some(table) = &mut self.table {
          table.rows.push(Vec::new());
        }
      }
      | "td" | "th" => {
        if let Some(table) = &mut self.table {
          if table.rows.is_empty() {
            table.rows.push(Vec::new());
          }
          if let Some(row) =
            table.rows.last_mut()
          {
            row.push(String::new());
          }
          table.in_cell = !empty;
        }
      }
      | "a" if !empty => {
        if let Some(download) =
          attribute(e, "download")
        {
          self.flush_if_content();
          self.file = Some(PendingFile {
            href: attribute(e, "href")
              .unwrap_or_default(),
            name: download,
            text: String::new()
          });
        } else {
          self.frames.push(StyleFrame {
            tag:  name,
            mark: None,
            link: attribute(e, "href")
          });
        }
      }
      | "strong" | "b" | "em" | "i"
      | "u" | "s" | "strike" | "del"
      | "span" | "font" | "code"
        if !empty =>
      {
        let mark = match name.as_str() {
          | "strong" | "b" => {
            Some(Mark::Bold)
          }
          | "em" | "i" => Some(Mark::Italic),
          | "u" => Some(Mark::Underline),
          | "s" | "strike" | "del" => {
            Some(Mark::Strike)
          }
          | _ => None
        };
        self.frames.push(StyleFrame {
          tag: name,
          mark,
          link: None
        });
      }
      | _ => {}
    }
  }

  fn end(&mut self, name: &str) {
    match name {
      | "p" | "div" | "h1" | "h2" | "h3"
      | "h4" | "h5" | "h6" | "blockquote"
      | "li" => self.flush(),
      | "ul" | "ol" => {
        self.flush();
        self.lists.pop();
      }
      | "td" | "th" => {
        if let Some(table) = &mut self.table {
          table.in_cell = false;
        }
      }
      | "table" => {
        if let Some(table) = self.table.take()
        {
          self.push_table(table);
        }
      }
      | "a" if self.file.is_some() => {
        if let Some(file) = self.file.take() {
          let name = if file.name.trim().is_empty() {
            file.text.trim().to_string()
          } else {
            file.name
          };
          self.blocks.push(Block::File {
            href: file.href,
            name
          });
        }
      }
      | _ => {
        if let Some(idx) = self
          .frames
          .iter()
          .rposition(|frame| frame.tag == name)
        {
          self.frames.truncate(idx);
        }
      }
    }
  }

  fn text(&mut self, text: &str) {
    if let Some(file) = &mut self.file {
      file.text.push_str(text);
      return;
    }

    if let Some(table) = &mut self.table {
      if table.in_cell
        && let Some(cell) = table
          .rows
          .last_mut()
          .and_then(|row| row.last_mut())
      {
        cell.push_str(text);
      }
      return;
    }

    let cleaned: String = text
      .chars()
      .map(|c| {
        if matches!(c, '\n' | '\r' | '\t')
        {
          ' '
        } else {
          c
        }
      })
      .collect();
    if cleaned.trim().is_empty()
      && self.current.is_none()
    {
      return;
    }

    let mut marks = Marks::default();
    let mut link = None;
    for frame in &self.frames {
      if let Some(mark) = frame.mark {
        marks.set(mark, true);
      }
      if frame.link.is_some() {
        link = frame.link.clone();
      }
    }

    let list = self.lists.last().copied();
    let (paragraph, _) =
      self.current.get_or_insert_with(|| {
        (
          Paragraph {
            list,
            ..Paragraph::default()
          },
          false
        )
      });
    paragraph.runs.push(Run {
      text: cleaned,
      marks,
      link
    });
  }

  fn open_paragraph(
    &mut self,
    align: Align,
    list: Option<ListKind>
  ) {
    self.current = Some((
      Paragraph {
        align,
        list,
        runs: Vec::new()
      },
      true
    ));
  }

  fn line_break(&mut self) {
    if let Some(table) = &mut self.table {
      if table.in_cell
        && let Some(cell) = table
          .rows
          .last_mut()
          .and_then(|row| row.last_mut())
      {
        cell.push('\n');
      }
      return;
    }
    let Some((paragraph, _)) = &self.current
    else {
      self.open_paragraph(
        Align::Left,
        self.lists.last().copied()
      );
      return;
    };
    if paragraph.is_empty() {
      return;
    }
    let align = paragraph.align;
    let list = paragraph.list;
    self.flush();
    self.open_paragraph(align, list);
  }

  fn flush_if_content(&mut self) {
    if self
      .current
      .as_ref()
      .is_some_and(|(p, _)| !p.is_empty())
    {
      self.flush();
    } else {
      self.current = None;
    }
  }

  fn flush(&mut self) {
    if let Some((mut paragraph, explicit)) =
      self.current.take()
      && (explicit || !paragraph.is_empty())
    {
      paragraph.normalize();
      self
        .blocks
        .push(Block::Paragraph(paragraph));
    }
  }

  fn push_table(
    &mut self,
    table: TableBuilder
  ) {
    let rows: Vec<Vec<String>> = table
      .rows
      .into_iter()
      .filter(|row| !row.is_empty())
      .collect();
    let cols = rows
      .iter()
      .map(Vec::len)
      .max()
      .unwrap_or(0);
    if cols == 0 {
      return;
    }
    let cells = rows
      .into_iter()
      .map(|mut row| {
        row.resize(cols, String::new());
        row
      })
      .collect();
    self.blocks.push(Block::Table { cells });
  }

  fn finish(mut self) -> Vec<Block> {
    if let Some(table) = self.table.take() {
      self.push_table(table);
    }
    if let Some(file) = self.file.take() {
      self.blocks.push(Block::File {
        href: file.href,
        name: file.name
      });
    }
    self.flush();
    if self.failed {
      debug!(
        blocks = self.blocks.len(),
        "finished after parse error"
      );
    }
    self.blocks
  }
}

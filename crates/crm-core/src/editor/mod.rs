//! Rich-text editing over an abstract
//! document. The editor owns its
//! selection, so formatting commands never
//! depend on when a host surface last
//! reported focus.

mod document;
mod html;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
pub use document::{
  Align,
  Block,
  Caret,
  Document,
  ListKind,
  Mark,
  Marks,
  Paragraph,
  Run,
  Selection
};
use thiserror::Error;
use tracing::{
  debug,
  info,
  warn
};
use url::Url;

pub const MAX_TABLE_DIMENSION: usize = 50;
pub const LARGE_ATTACHMENT_BYTES: usize =
  1024 * 1024;

const LINK_SCHEMES: [&str; 5] =
  ["http", "https", "mailto", "tel", "ftp"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditorError {
  #[error("position {block}:{offset} is outside the document")]
  InvalidPosition {
    block:  usize,
    offset: usize
  },

  #[error("link URL is empty")]
  EmptyLink,

  #[error("invalid link URL: {0}")]
  InvalidLink(String),

  #[error(
    "table needs 1 to {max} rows and columns, got rows={rows:?} cols={cols:?}",
    max = MAX_TABLE_DIMENSION
  )]
  InvalidTableSize {
    rows: String,
    cols: String
  }
}

/// Toolbar state derived from the document
/// and selection on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatState {
  pub bold:           bool,
  pub italic:         bool,
  pub underline:      bool,
  pub strike:         bool,
  pub ordered_list:   bool,
  pub unordered_list: bool,
  pub align:          Align
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
  doc:       Document,
  selection: Selection,
  saved:     Option<Selection>,
  pending:   Option<Marks>
}

impl Default for Editor {
  fn default() -> Self {
    Self::new()
  }
}

enum Slot {
  Replace,
  Before,
  After,
  Split
}

impl Editor {
  pub fn new() -> Self {
    Self::with_document(Document::new())
  }

  pub fn from_html(html: &str) -> Self {
    Self::with_document(Document::from_html(
      html
    ))
  }

  fn with_document(doc: Document) -> Self {
    let end = doc.end();
    Self {
      doc,
      selection: Selection::collapsed(end),
      saved: None,
      pending: None
    }
  }

  pub fn document(&self) -> &Document {
    &self.doc
  }

  pub fn selection(&self) -> Selection {
    self.selection
  }

  pub fn html(&self) -> String {
    self.doc.to_html()
  }

  pub fn plain_text(&self) -> String {
    self.doc.plain_text()
  }

  pub fn is_empty(&self) -> bool {
    self.doc.is_empty()
  }

  /// Replaces the content from outside
  /// (e.g. a freshly loaded deal) only when
  /// it differs, so an unchanged value
  /// keeps the caret where it is.
  pub fn sync_from_html(
    &mut self,
    html: &str
  ) -> bool {
    if self.html() == html {
      return false;
    }
    self.doc = Document::from_html(html);
    self.selection = Selection {
      anchor: self
        .doc
        .clamp(self.selection.anchor),
      focus:  self
        .doc
        .clamp(self.selection.focus)
    };
    self.saved = None;
    self.pending = None;
    true
  }

  pub fn select(
    &mut self,
    anchor: Caret,
    focus: Caret
  ) -> Result<(), EditorError> {
    for caret in [anchor, focus] {
      if !self.doc.contains(caret) {
        return Err(
          EditorError::InvalidPosition {
            block:  caret.block,
            offset: caret.offset
          }
        );
      }
    }
    self.selection =
      Selection { anchor, focus };
    self.pending = None;
    Ok(())
  }

  pub fn set_caret(
    &mut self,
    at: Caret
  ) -> Result<(), EditorError> {
    self.select(at, at)
  }

  pub fn select_all(&mut self) {
    self.selection = Selection {
      anchor: Caret::default(),
      focus:  self.doc.end()
    };
    self.pending = None;
  }

  pub fn move_to_end(&mut self) {
    self.selection =
      Selection::collapsed(self.doc.end());
  }

  pub fn save_selection(&mut self) {
    self.saved = Some(self.selection);
  }

  /// Restores the saved selection. A saved
  /// range that no longer fits the
  /// document moves the caret to the end.
  pub fn restore_selection(
    &mut self
  ) -> bool {
    let Some(saved) = self.saved.take()
    else {
      return true;
    };
    if self.doc.contains(saved.anchor)
      && self.doc.contains(saved.focus)
    {
      self.selection = saved;
      true
    } else {
      debug!(
        anchor = ?saved.anchor,
        focus = ?saved.focus,
        "saved selection is stale; inserting at end of document"
      );
      self.move_to_end();
      false
    }
  }

  #[tracing::instrument(skip(self, text), fields(chars = text.chars().count()))]
  pub fn insert_text(&mut self, text: &str) {
    if text.is_empty() {
      return;
    }
    self.delete_selection();
    let marks = self
      .pending
      .take()
      .unwrap_or_else(|| self.marks_at_caret());

    for (idx, line) in
      text.split('\n').enumerate()
    {
      if idx > 0 {
        self.split_block();
      }
      let line = line.trim_end_matches('\r');
      if line.is_empty() {
        continue;
      }
      let caret = self.paragraph_caret();
      if let Some(p) = self.doc.blocks
        [caret.block]
        .as_paragraph_mut()
      {
        p.insert(caret.offset, Run {
          text: line.to_string(),
          marks,
          link: None
        });
      }
      self.selection =
        Selection::collapsed(Caret::new(
          caret.block,
          caret.offset + line.chars().count()
        ));
    }
  }

  /// Enter: splits the current paragraph,
  /// keeping alignment and list style on
  /// both halves.
  pub fn split_block(&mut self) {
    self.delete_selection();
    let caret = self.caret();
    let next = self
      .split_paragraph_at(caret)
      .unwrap_or_default();
    self
      .doc
      .blocks
      .insert(caret.block + 1, Block::Paragraph(next));
    self.selection = Selection::collapsed(
      Caret::new(caret.block + 1, 0)
    );
  }

  pub fn delete_selection(&mut self) -> bool {
    if self.selection.is_collapsed() {
      return false;
    }
    let (start, end) = self.clamped_range();

    if start.block == end.block {
      if let Some(p) = self.doc.blocks
        [start.block]
        .as_paragraph_mut()
      {
        p.delete(start.offset, end.offset);
      }
    } else {
      let tail = self.doc.blocks[end.block]
        .as_paragraph()
        .map(|p| p.split_runs(end.offset).1);
      self
        .doc
        .blocks
        .drain(start.block + 1..=end.block);
      match &mut self.doc.blocks[start.block] {
        | Block::Paragraph(p) => {
          p.truncate(start.offset);
          if let Some(tail) = tail {
            p.append(tail);
          }
        }
        | other => {
          *other = Block::Paragraph(
            Paragraph::with_runs(
              tail.unwrap_or_default()
            )
          );
        }
      }
    }

    self.doc.normalize();
    self.selection = Selection::collapsed(
      self.doc.clamp(start)
    );
    true
  }

  #[tracing::instrument(skip(self))]
  pub fn toggle_mark(
    &mut self,
    mark: Mark
  ) -> FormatState {
    if self.selection.is_collapsed() {
      let current = self
        .pending
        .unwrap_or_else(|| self.marks_at_caret());
      self.pending = Some(
        current.with(mark, !current.has(mark))
      );
    } else {
      let on = !self.range_has(mark);
      self.for_each_paragraph(|p, s, e| {
        p.apply(s, e, |run| {
          run.marks.set(mark, on)
        })
      });
    }
    self.format_state()
  }

  pub fn set_alignment(&mut self, align: Align) {
    self.for_each_paragraph(|p, _, _| {
      p.align = align
    });
  }

  pub fn toggle_list(
    &mut self,
    kind: ListKind
  ) -> FormatState {
    let lists: Vec<Option<ListKind>> = self
      .paragraph_slices()
      .iter()
      .map(|(p, _, _)| p.list)
      .collect();
    let all_on = !lists.is_empty()
      && lists
        .iter()
        .all(|list| *list == Some(kind));
    let target =
      if all_on { None } else { Some(kind) };
    self.for_each_paragraph(|p, _, _| {
      p.list = target
    });
    self.format_state()
  }

  pub fn format_state(&self) -> FormatState {
    let marks = if self.selection.is_collapsed()
    {
      self
        .pending
        .unwrap_or_else(|| self.marks_at_caret())
    } else {
      Marks {
        bold:      self.range_has(Mark::Bold),
        italic:    self.range_has(Mark::Italic),
        underline: self
          .range_has(Mark::Underline),
        strike:    self.range_has(Mark::Strike)
      }
    };

    let (start, _) = self.clamped_range();
    let paragraph =
      self.doc.blocks[start.block].as_paragraph();
    let list = paragraph.and_then(|p| p.list);

    FormatState {
      bold: marks.bold,
      italic: marks.italic,
      underline: marks.underline,
      strike: marks.strike,
      ordered_list: list
        == Some(ListKind::Ordered),
      unordered_list: list
        == Some(ListKind::Unordered),
      align: paragraph
        .map(|p| p.align)
        .unwrap_or_default()
    }
  }

  /// Links the selected text, or inserts
  /// `text` (the URL when absent) as a
  /// link at the caret.
  #[tracing::instrument(skip(self, text))]
  pub fn insert_link(
    &mut self,
    url: &str,
    text: Option<&str>
  ) -> Result<(), EditorError> {
    let href = normalize_link(url)?;
    self.restore_selection();

    if !self.selection.is_collapsed() {
      self.for_each_paragraph(|p, s, e| {
        p.apply(s, e, |run| {
          run.link = Some(href.clone())
        })
      });
      info!(href = %href, "linked selection");
      return Ok(());
    }

    let label = text
      .map(str::trim)
      .filter(|label| !label.is_empty())
      .unwrap_or(&href)
      .to_string();
    let caret = self.paragraph_caret();
    let marks = self.marks_at_caret();
    let len = label.chars().count();
    if let Some(p) = self.doc.blocks
      [caret.block]
      .as_paragraph_mut()
    {
      p.insert(caret.offset, Run {
        text: label,
        marks,
        link: Some(href.clone())
      });
    }
    self.selection = Selection::collapsed(
      Caret::new(caret.block, caret.offset + len)
    );
    info!(href = %href, "inserted link");
    Ok(())
  }

  /// Inserts an empty table. Sizes arrive
  /// as typed text and are validated before
  /// the document is touched.
  #[tracing::instrument(skip(self))]
  pub fn insert_table(
    &mut self,
    rows: &str,
    cols: &str
  ) -> Result<(), EditorError> {
    let bounded = |raw: &str| {
      raw
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| {
          (1..=MAX_TABLE_DIMENSION).contains(n)
        })
    };
    let (Some(row_count), Some(col_count)) =
      (bounded(rows), bounded(cols))
    else {
      warn!("rejected table size");
      return Err(EditorError::InvalidTableSize {
        rows: rows.to_string(),
        cols: cols.to_string()
      });
    };

    self.restore_selection();
    self.insert_block(Block::Table {
      cells: vec![
        vec![String::new(); col_count];
        row_count
      ]
    });
    info!(
      rows = row_count,
      cols = col_count,
      "inserted table"
    );
    Ok(())
  }

  /// Embeds a file as a base64 data URL:
  /// images inline, anything else as a
  /// download link.
  #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
  pub fn insert_attachment(
    &mut self,
    name: &str,
    mime: &str,
    bytes: &[u8]
  ) {
    if bytes.len() > LARGE_ATTACHMENT_BYTES {
      warn!(
        name,
        size = bytes.len(),
        "embedding large attachment inline"
      );
    }
    let mime = match mime.trim() {
      | "" => "application/octet-stream",
      | other => other
    };
    let data_url = format!(
      "data:{mime};base64,{}",
      STANDARD.encode(bytes)
    );
    let name = match name.trim() {
      | "" => "archivo".to_string(),
      | other => other.to_string()
    };

    let block = if mime.starts_with("image/") {
      Block::Image {
        src: data_url,
        name
      }
    } else {
      Block::File {
        href: data_url,
        name
      }
    };
    self.restore_selection();
    self.insert_block(block);
  }

  fn caret(&self) -> Caret {
    self.doc.clamp(self.selection.focus)
  }

  fn clamped_range(&self) -> (Caret, Caret) {
    let (start, end) = self.selection.range();
    (self.doc.clamp(start), self.doc.clamp(end))
  }

  fn marks_at_caret(&self) -> Marks {
    let caret = self.caret();
    self.doc.blocks[caret.block]
      .as_paragraph()
      .map(|p| p.marks_at(caret.offset))
      .unwrap_or_default()
  }

  /// Caret inside a paragraph, adding one
  /// after an embedded block if needed.
  fn paragraph_caret(&mut self) -> Caret {
    let caret = self.caret();
    if self.doc.blocks[caret.block]
      .as_paragraph()
      .is_some()
    {
      return caret;
    }
    let at = Caret::new(caret.block + 1, 0);
    self
      .doc
      .blocks
      .insert(at.block, Block::empty_paragraph());
    self.selection = Selection::collapsed(at);
    at
  }

  fn split_paragraph_at(
    &mut self,
    caret: Caret
  ) -> Option<Paragraph> {
    let p = self.doc.blocks[caret.block]
      .as_paragraph_mut()?;
    let (head, tail) =
      p.split_runs(caret.offset);
    p.runs = head;
    p.normalize();
    let mut next = Paragraph {
      align: p.align,
      list:  p.list,
      runs:  tail
    };
    next.normalize();
    Some(next)
  }

  fn insert_block(&mut self, block: Block) {
    self.delete_selection();
    let caret = self.caret();
    let slot = match self.doc.blocks
      [caret.block]
      .as_paragraph()
    {
      | Some(p) if p.is_empty() => {
        Slot::Replace
      }
      | Some(_) if caret.offset == 0 => {
        Slot::Before
      }
      | Some(p)
        if caret.offset >= p.char_len() =>
      {
        Slot::After
      }
      | Some(_) => Slot::Split,
      | None => Slot::After
    };

    let index = match slot {
      | Slot::Replace => {
        self.doc.blocks[caret.block] = block;
        caret.block
      }
      | Slot::Before => {
        self.doc.blocks.insert(caret.block, block);
        caret.block
      }
      | Slot::After => {
        self
          .doc
          .blocks
          .insert(caret.block + 1, block);
        caret.block + 1
      }
      | Slot::Split => {
        let tail = self
          .split_paragraph_at(caret)
          .unwrap_or_default();
        self
          .doc
          .blocks
          .insert(caret.block + 1, block);
        self.doc.blocks.insert(
          caret.block + 2,
          Block::Paragraph(tail)
        );
        caret.block + 1
      }
    };

    let next = index + 1;
    if !matches!(
      self.doc.blocks.get(next),
      Some(Block::Paragraph(_))
    ) {
      self
        .doc
        .blocks
        .insert(next, Block::empty_paragraph());
    }
    self.doc.normalize();
    self.selection =
      Selection::collapsed(Caret::new(next, 0));
  }

  fn paragraph_slices(
    &self
  ) -> Vec<(&Paragraph, usize, usize)> {
    let (start, end) = self.clamped_range();
    (start.block..=end.block)
      .filter_map(|idx| {
        let p = self.doc.blocks[idx]
          .as_paragraph()?;
        let from = if idx == start.block {
          start.offset
        } else {
          0
        };
        let to = if idx == end.block {
          end.offset
        } else {
          p.char_len()
        };
        Some((p, from, to))
      })
      .collect()
  }

  fn for_each_paragraph(
    &mut self,
    mut edit: impl FnMut(
      &mut Paragraph,
      usize,
      usize
    )
  ) {
    let (start, end) = self.clamped_range();
    for idx in start.block..=end.block {
      let Some(p) =
        self.doc.blocks[idx].as_paragraph_mut()
      else {
        continue;
      };
      let from = if idx == start.block {
        start.offset
      } else {
        0
      };
      let to = if idx == end.block {
        end.offset
      } else {
        p.char_len()
      };
      edit(p, from, to);
    }
  }

  /// True when every selected character
  /// carries `mark`.
  fn range_has(&self, mark: Mark) -> bool {
    let mut any = false;
    for (p, from, to) in self.paragraph_slices() {
      for run in p.runs_in(from, to) {
        any = true;
        if !run.marks.has(mark) {
          return false;
        }
      }
    }
    any
  }
}

/// Accepts absolute http(s), mailto, tel
/// and ftp URLs; anything else is tried
/// again with `https://` in front.
pub fn normalize_link(
  raw: &str
) -> Result<String, EditorError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(EditorError::EmptyLink);
  }
  if let Ok(url) = Url::parse(trimmed)
    && LINK_SCHEMES.contains(&url.scheme())
  {
    return Ok(trimmed.to_string());
  }
  let prefixed = format!("https://{trimmed}");
  match Url::parse(&prefixed) {
    | Ok(url) if url.host().is_some() => {
      Ok(prefixed)
    }
    | _ => Err(EditorError::InvalidLink(
      trimmed.to_string()
    ))
  }
}

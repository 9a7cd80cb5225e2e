#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
  Bold,
  Italic,
  Underline,
  Strike
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
)]
pub struct Marks {
  pub bold:      bool,
  pub italic:    bool,
  pub underline: bool,
  pub strike:    bool
}

impl Marks {
  pub fn has(self, mark: Mark) -> bool {
    match mark {
      | Mark::Bold => self.bold,
      | Mark::Italic => self.italic,
      | Mark::Underline => self.underline,
      | Mark::Strike => self.strike
    }
  }

  pub fn set(
    &mut self,
    mark: Mark,
    on: bool
  ) {
    match mark {
      | Mark::Bold => self.bold = on,
      | Mark::Italic => self.italic = on,
      | Mark::Underline => {
        self.underline = on
      }
      | Mark::Strike => self.strike = on
    }
  }

  pub fn with(
    mut self,
    mark: Mark,
    on: bool
  ) -> Self {
    self.set(mark, on);
    self
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
)]
pub enum Align {
  #[default]
  Left,
  Center,
  Right,
  Justify
}

impl Align {
  pub fn as_css(self) -> &'static str {
    match self {
      | Align::Left => "left",
      | Align::Center => "center",
      | Align::Right => "right",
      | Align::Justify => "justify"
    }
  }

  pub fn from_css(
    value: &str
  ) -> Option<Self> {
    match value
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "left" | "start" => {
        Some(Align::Left)
      }
      | "center" => Some(Align::Center),
      | "right" | "end" => {
        Some(Align::Right)
      }
      | "justify" => Some(Align::Justify),
      | _ => None
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
  Ordered,
  Unordered
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
  pub text:  String,
  pub marks: Marks,
  pub link:  Option<String>
}

impl Run {
  pub fn plain(
    text: impl Into<String>
  ) -> Self {
    Self {
      text:  text.into(),
      marks: Marks::default(),
      link:  None
    }
  }

  pub fn char_len(&self) -> usize {
    self.text.chars().count()
  }

  fn same_style(
    &self,
    other: &Run
  ) -> bool {
    self.marks == other.marks
      && self.link == other.link
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
  pub align: Align,
  pub list:  Option<ListKind>,
  pub runs:  Vec<Run>
}

impl Paragraph {
  pub fn with_runs(runs: Vec<Run>) -> Self {
    let mut paragraph = Self {
      runs,
      ..Self::default()
    };
    paragraph.normalize();
    paragraph
  }

  pub fn char_len(&self) -> usize {
    self.runs.iter().map(Run::char_len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.runs.iter().all(|run| run.text.is_empty())
  }

  pub fn text(&self) -> String {
    self
      .runs
      .iter()
      .map(|run| run.text.as_str())
      .collect()
  }

  /// Splits into the runs before and after
  /// a character offset.
  pub fn split_runs(
    &self,
    offset: usize
  ) -> (Vec<Run>, Vec<Run>) {
    let mut head = Vec::new();
    let mut tail = Vec::new();
    let mut seen = 0;

    for run in &self.runs {
      let len = run.char_len();
      if seen + len <= offset {
        head.push(run.clone());
      } else if seen >= offset {
        tail.push(run.clone());
      } else {
        let cut = byte_index(
          &run.text,
          offset - seen
        );
        head.push(Run {
          text: run.text[..cut].to_string(),
          ..run.clone()
        });
        tail.push(Run {
          text: run.text[cut..].to_string(),
          ..run.clone()
        });
      }
      seen += len;
    }

    (head, tail)
  }

  pub fn truncate(&mut self, offset: usize) {
    let (head, _) = self.split_runs(offset);
    self.runs = head;
    self.normalize();
  }

  pub fn append(&mut self, runs: Vec<Run>) {
    self.runs.extend(runs);
    self.normalize();
  }

  pub fn insert(
    &mut self,
    offset: usize,
    run: Run
  ) {
    let (mut head, tail) =
      self.split_runs(offset);
    head.push(run);
    head.extend(tail);
    self.runs = head;
    self.normalize();
  }

  pub fn delete(
    &mut self,
    start: usize,
    end: usize
  ) {
    if end <= start {
      return;
    }
    let (head, _) = self.split_runs(start);
    let (_, tail) = self.split_runs(end);
    self.runs = head;
    self.runs.extend(tail);
    self.normalize();
  }

  /// Applies `edit` to every run inside
  /// `start..end`, splitting runs at the
  /// boundaries first.
  pub fn apply(
    &mut self,
    start: usize,
    end: usize,
    mut edit: impl FnMut(&mut Run)
  ) {
    if end <= start {
      return;
    }
    let (head, rest) =
      self.split_runs(start);
    let middle_len = end - start;
    let rest_paragraph = Paragraph {
      runs: rest,
      ..Paragraph::default()
    };
    let (mut middle, tail) =
      rest_paragraph.split_runs(middle_len);
    for run in &mut middle {
      edit(run);
    }

    self.runs = head;
    self.runs.extend(middle);
    self.runs.extend(tail);
    self.normalize();
  }

  /// Runs covering `start..end`, or the run
  /// touching a collapsed position.
  pub fn runs_in(
    &self,
    start: usize,
    end: usize
  ) -> Vec<&Run> {
    let mut out = Vec::new();
    let mut seen = 0;
    for run in &self.runs {
      let len = run.char_len();
      let run_end = seen + len;
      if run_end > start && seen < end {
        out.push(run);
      }
      seen = run_end;
    }
    out
  }

  /// Style that text typed at `offset`
  /// inherits: the character before it, or
  /// the first character at the start.
  pub fn marks_at(
    &self,
    offset: usize
  ) -> Marks {
    let probe = offset.saturating_sub(1);
    self
      .runs_in(probe, probe + 1)
      .first()
      .map(|run| run.marks)
      .unwrap_or_default()
  }

  pub fn normalize(&mut self) {
    let mut merged: Vec<Run> =
      Vec::with_capacity(self.runs.len());
    for run in self.runs.drain(..) {
      if run.text.is_empty() {
        continue;
      }
      match merged.last_mut() {
        | Some(last)
          if last.same_style(&run) =>
        {
          last.text.push_str(&run.text);
        }
        | _ => merged.push(run)
      }
    }
    self.runs = merged;
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
  Paragraph(Paragraph),
  Table {
    cells: Vec<Vec<String>>
  },
  Image {
    src:  String,
    name: String
  },
  File {
    href: String,
    name: String
  }
}

impl Block {
  pub fn empty_paragraph() -> Self {
    Block::Paragraph(Paragraph::default())
  }

  pub fn as_paragraph(
    &self
  ) -> Option<&Paragraph> {
    match self {
      | Block::Paragraph(p) => Some(p),
      | _ => None
    }
  }

  pub fn as_paragraph_mut(
    &mut self
  ) -> Option<&mut Paragraph> {
    match self {
      | Block::Paragraph(p) => Some(p),
      | _ => None
    }
  }

  /// Caret positions inside the block.
  /// Embedded blocks only have offset 0.
  pub fn char_len(&self) -> usize {
    self
      .as_paragraph()
      .map(Paragraph::char_len)
      .unwrap_or(0)
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Caret {
  pub block:  usize,
  pub offset: usize
}

impl Caret {
  pub fn new(
    block: usize,
    offset: usize
  ) -> Self {
    Self { block, offset }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
  pub anchor: Caret,
  pub focus:  Caret
}

impl Selection {
  pub fn collapsed(at: Caret) -> Self {
    Self {
      anchor: at,
      focus:  at
    }
  }

  pub fn is_collapsed(&self) -> bool {
    self.anchor == self.focus
  }

  /// The selection as an ordered
  /// `(start, end)` pair.
  pub fn range(&self) -> (Caret, Caret) {
    if self.anchor <= self.focus {
      (self.anchor, self.focus)
    } else {
      (self.focus, self.anchor)
    }
  }
}

/// Rich-text content: a non-empty list of
/// blocks that always ends with a
/// paragraph, so there is somewhere to
/// type after a table or attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
  pub(crate) blocks: Vec<Block>
}

impl Default for Document {
  fn default() -> Self {
    Self {
      blocks: vec![Block::empty_paragraph()]
    }
  }
}

impl Document {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_blocks(
    blocks: Vec<Block>
  ) -> Self {
    let mut doc = Self { blocks };
    doc.normalize();
    doc
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.iter().all(|block| {
      block
        .as_paragraph()
        .is_some_and(Paragraph::is_empty)
    })
  }

  pub fn end(&self) -> Caret {
    let block =
      self.blocks.len().saturating_sub(1);
    Caret::new(
      block,
      self
        .blocks
        .get(block)
        .map(Block::char_len)
        .unwrap_or(0)
    )
  }

  pub fn contains(
    &self,
    caret: Caret
  ) -> bool {
    self
      .blocks
      .get(caret.block)
      .is_some_and(|block| {
        caret.offset <= block.char_len()
      })
  }

  pub fn clamp(
    &self,
    caret: Caret
  ) -> Caret {
    if caret.block >= self.blocks.len() {
      return self.end();
    }
    let len = self.blocks[caret.block]
      .char_len();
    Caret::new(
      caret.block,
      caret.offset.min(len)
    )
  }

  pub(crate) fn normalize(&mut self) {
    for block in &mut self.blocks {
      if let Block::Paragraph(p) = block {
        p.normalize();
      }
    }
    if !matches!(
      self.blocks.last(),
      Some(Block::Paragraph(_))
    ) {
      self
        .blocks
        .push(Block::empty_paragraph());
    }
  }

  pub fn plain_text(&self) -> String {
    self
      .blocks
      .iter()
      .map(|block| match block {
        | Block::Paragraph(p) => p.text(),
        | Block::Table { cells } => cells
          .iter()
          .map(|row| row.join(" "))
          .collect::<Vec<_>>()
          .join(" "),
        | Block::Image { name, .. }
        | Block::File { name, .. } => {
          name.clone()
        }
      })
      .filter(|line| !line.is_empty())
      .collect::<Vec<_>>()
      .join("\n")
  }
}

pub(crate) fn byte_index(
  text: &str,
  char_offset: usize
) -> usize {
  text
    .char_indices()
    .nth(char_offset)
    .map(|(idx, _)| idx)
    .unwrap_or(text.len())
}

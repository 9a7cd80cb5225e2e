use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{
  debug,
  trace
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
  Enter,
  Escape,
  Char(char)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
  pub key:  Key,
  pub ctrl: bool,
  pub meta: bool
}

impl KeyChord {
  pub fn plain(key: Key) -> Self {
    Self {
      key,
      ctrl: false,
      meta: false
    }
  }

  pub fn ctrl(key: Key) -> Self {
    Self {
      key,
      ctrl: true,
      meta: false
    }
  }

  pub fn meta(key: Key) -> Self {
    Self {
      key,
      ctrl: false,
      meta: true
    }
  }

  /// Ctrl+Enter (Cmd+Enter on macOS)
  /// submits; Escape closes.
  pub fn action(
    self
  ) -> Option<ShortcutAction> {
    match self.key {
      | Key::Enter if self.ctrl || self.meta => {
        Some(ShortcutAction::Submit)
      }
      | Key::Escape => {
        Some(ShortcutAction::Close)
      }
      | _ => None
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
  Submit,
  Close
}

#[derive(Debug, Default)]
struct HubState {
  next_id: u64,
  stack:   Vec<u64>
}

/// Document-level shortcut registry.
/// Only the most recent live subscription
/// receives keys, so stacked modals do not
/// both react to one Escape.
#[derive(Debug, Clone, Default)]
pub struct ShortcutHub {
  state: Arc<Mutex<HubState>>
}

impl ShortcutHub {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(
    &self,
    owner: &'static str
  ) -> Subscription {
    let mut state = self.state.lock();
    state.next_id += 1;
    let id = state.next_id;
    state.stack.push(id);
    debug!(owner, id, active = state.stack.len(), "keyboard shortcuts subscribed");
    Subscription {
      id,
      owner,
      state: Arc::clone(&self.state)
    }
  }

  pub fn active_count(&self) -> usize {
    self.state.lock().stack.len()
  }
}

/// Live registration in a [`ShortcutHub`].
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
  id:    u64,
  owner: &'static str,
  state: Arc<Mutex<HubState>>
}

impl Subscription {
  /// Maps a chord to an action when this
  /// subscription is the one in focus.
  pub fn dispatch(
    &self,
    chord: KeyChord
  ) -> Option<ShortcutAction> {
    let focused = self.state.lock().stack.last()
      == Some(&self.id);
    if !focused {
      trace!(owner = self.owner, "shortcut ignored; another subscriber has focus");
      return None;
    }
    chord.action()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let mut state = self.state.lock();
    state.stack.retain(|id| *id != self.id);
    debug!(
      owner = self.owner,
      id = self.id,
      active = state.stack.len(),
      "keyboard shortcuts released"
    );
  }
}

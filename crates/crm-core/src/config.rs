use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_API_URL: &str =
  "http://localhost:3000/api";
pub const DEFAULT_API_TIMEOUT_SECS: u64 =
  30;

const CRMRC_ENV_VAR: &str = "CRMRC";
const API_URL_ENV_VAR: &str =
  "CRM_API_URL";
const API_TOKEN_ENV_VAR: &str =
  "CRM_API_TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "api.url".to_string(),
      DEFAULT_API_URL.to_string()
    );
    map.insert(
      "api.timeout".to_string(),
      DEFAULT_API_TIMEOUT_SECS.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    crmrc_override
  ))]
  pub fn load(
    crmrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let crmrc = resolve_crmrc_path(
      crmrc_override
    )?;
    if let Some(path) = crmrc {
      info!(crmrc = %path.display(), "loading crmrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no crmrc found; using \
         defaults"
      );
    }

    cfg.apply_env();
    Ok(cfg)
  }

  fn apply_env(&mut self) {
    for (var, key) in [
      (API_URL_ENV_VAR, "api.url"),
      (API_TOKEN_ENV_VAR, "api.token")
    ] {
      if let Ok(value) = std::env::var(var)
        && !value.trim().is_empty()
      {
        debug!(var, key, "applying environment override");
        self.map.insert(
          key.to_string(),
          value.trim().to_string()
        );
      }
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      if key == "api.token" {
        debug!(key = %key, "applying override");
      } else {
        debug!(key = %key, value = %v, "applying override");
      }
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  pub fn api_token(
    &self
  ) -> Option<String> {
    self
      .get("api.token")
      .filter(|token| {
        !token.trim().is_empty()
      })
  }

  pub fn api_timeout_secs(
    &self
  ) -> anyhow::Result<u64> {
    let Some(raw) = self.get("api.timeout")
    else {
      return Ok(DEFAULT_API_TIMEOUT_SECS);
    };
    let secs: u64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid api.timeout: {raw}"
          )
        }
      )?;
    if secs == 0 {
      return Err(anyhow!(
        "api.timeout must be at least \
         one second"
      ));
    }
    Ok(secs)
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!("failed to read {}", path.display())
      })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    for (idx, raw_line) in text.lines().enumerate() {
      let line_no = idx + 1;
      match RcLine::parse(raw_line) {
        | Some(RcLine::Blank) => {}
        | Some(RcLine::Include(target)) => {
          let target =
            resolve_include_path(&base_dir, target)?;
          self.include(&path, line_no, &target)?;
        }
        | Some(RcLine::Entry(key, value)) => {
          trace!(key, line = line_no, "loaded config key");
          self
            .map
            .insert(key.to_string(), value.to_string());
        }
        | None => {
          return Err(anyhow!(
            "invalid config line {}:{line_no}: {raw_line}",
            path.display()
          ));
        }
      }
    }

    Ok(())
  }

  fn include(
    &mut self,
    from: &Path,
    line_no: usize,
    target: &Path
  ) -> anyhow::Result<()> {
    if self.loaded_files.iter().any(|seen| seen == target) {
      warn!(include = %target.display(), "include cycle detected; skipping");
      return Ok(());
    }
    if !target.exists() {
      warn!(include = %target.display(), "include file does not exist; skipping");
      return Ok(());
    }
    debug!(
      file = %from.display(),
      include = %target.display(),
      line = line_no,
      "processing include"
    );
    self.load_file(target)
  }
}

/// One line of a crmrc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Entry(&'a str, &'a str)
}

impl<'a> RcLine<'a> {
  /// `None` for a line that is neither a
  /// comment, an include nor `key = value`.
  fn parse(raw: &'a str) -> Option<Self> {
    let line = raw.trim();
    let line = match line.split_once(" #") {
      | Some((before, _)) => before.trim_end(),
      | None => line
    };
    if line.is_empty() || line.starts_with('#') {
      return Some(RcLine::Blank);
    }
    if let Some(rest) = line.strip_prefix("include ") {
      return Some(RcLine::Include(rest.trim()));
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty())
      .then_some(RcLine::Entry(key, value.trim()))
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_crmrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(crmrc_env) =
    std::env::var(CRMRC_ENV_VAR)
  {
    if crmrc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      crmrc_env
    )));
  }

  let Some(home) = dirs::home_dir() else {
    warn!(
      "cannot determine home \
       directory; skipping ~/.crmrc"
    );
    return Ok(None);
  };
  let candidate = home.join(".crmrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn loads_file_with_includes_and_comments()
  {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "api.timeout = 12\n"
    )
    .expect("write include");
    let main = temp.path().join("crmrc");
    fs::write(
      &main,
      "# CRM client\napi.url = https://crm.example.pe/api # prod\ninclude extra.rc\ncolor = off\n",
    )
    .expect("write crmrc");

    let mut cfg = Config::default();
    cfg.load_file(&main).expect("load");

    assert_eq!(
      cfg.api_url(),
      "https://crm.example.pe/api"
    );
    assert_eq!(
      cfg.api_timeout_secs().expect("timeout"),
      12
    );
    assert_eq!(cfg.get("color").as_deref(), Some("off"));
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp = tempdir().expect("tempdir");
    let main = temp.path().join("crmrc");
    fs::write(&main, "api.url\n")
      .expect("write crmrc");

    let mut cfg = Config::default();
    assert!(cfg.load_file(&main).is_err());
  }

  #[test]
  fn classifies_rc_lines() {
    assert_eq!(RcLine::parse("  # note"), Some(RcLine::Blank));
    assert_eq!(
      RcLine::parse("include ~/.crm/extra # shared"),
      Some(RcLine::Include("~/.crm/extra"))
    );
    assert_eq!(
      RcLine::parse("api.token = abc=def"),
      Some(RcLine::Entry("api.token", "abc=def"))
    );
    assert_eq!(RcLine::parse(" = orphan"), None);
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.api.token".to_string(),
        "secret".to_string()
      ),
      (
        "api.timeout".to_string(),
        "0".to_string()
      )
    ]);
    assert_eq!(
      cfg.api_token().as_deref(),
      Some("secret")
    );
    assert!(cfg.api_timeout_secs().is_err());
  }
}

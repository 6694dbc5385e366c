use std::collections::BTreeMap;
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
  warn
};

const RC_ENV_VAR: &str = "PLANNERRC";
const RC_FILE_NAME: &str = ".plannerrc";

/// Planner settings read from the rc
/// file. The file is TOML; nested
/// tables are flattened to dotted
/// keys, so `[holiday] country = "DE"`
/// reads back as `holiday.country`.
#[derive(Debug, Clone)]
pub struct Config {
  map:        BTreeMap<String, String>,
  pub source: Option<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      ("data.location", "~/.planner"),
      ("color", "on")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();
    Self {
      map,
      source: None
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();
    let Some(path) =
      locate_rc(rc_override)
    else {
      debug!("no plannerrc; defaults only");
      return Ok(cfg);
    };

    info!(plannerrc = %path.display(), "loading plannerrc");
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    cfg.merge_toml(&text).with_context(
      || {
        format!(
          "invalid plannerrc {}",
          path.display()
        )
      }
    )?;
    cfg.source = Some(path);
    Ok(cfg)
  }

  /// Layers `text` over the current
  /// values.
  pub fn merge_toml(
    &mut self,
    text: &str
  ) -> anyhow::Result<()> {
    let table =
      toml::from_str::<toml::Table>(
        text
      )?;
    flatten_into(
      "",
      &table,
      &mut self.map
    )
  }

  /// `rc.`-prefixed or bare keys from
  /// the command line; last one wins.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = raw_key
        .strip_prefix("rc.")
        .unwrap_or(&raw_key)
        .trim()
        .to_string();
      debug!(key = %key, value = %value, "rc override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Like [`Config::get`] but treats
  /// blank values as unset.
  pub fn get_nonempty(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
      .map(str::to_string)
  }

  /// `Ok(None)` when unset; an error
  /// when set to something that is not
  /// a yes/no word.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|raw| {
        parse_bool(raw).ok_or_else(
          || {
            anyhow!(
              "invalid {key} setting: \
               {raw} (expected on or off)"
            )
          }
        )
      })
      .transpose()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }
}

fn flatten_into(
  prefix: &str,
  table: &toml::Table,
  out: &mut BTreeMap<String, String>
) -> anyhow::Result<()> {
  for (key, value) in table {
    let key = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };
    let flat = match value {
      | toml::Value::Table(inner) => {
        flatten_into(&key, inner, out)?;
        continue;
      }
      | toml::Value::String(s) => {
        s.clone()
      }
      | toml::Value::Boolean(b) => {
        b.to_string()
      }
      | toml::Value::Integer(i) => {
        i.to_string()
      }
      | other => {
        return Err(anyhow!(
          "{key}: expected a string, \
           boolean or integer, got {}",
          other.type_str()
        ));
      }
    };
    out.insert(key, flat);
  }
  Ok(())
}

/// `--data`, else `data.location`,
/// else `~/.planner`.
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  if let Some(path) = override_dir {
    return Ok(path.to_path_buf());
  }
  if let Some(raw) =
    cfg.get_nonempty("data.location")
  {
    return Ok(expand_tilde(&raw));
  }
  dirs::home_dir()
    .map(|home| home.join(".planner"))
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory; pass --data"
      )
    })
}

/// `holiday.location`, else
/// `<data>/holidays`.
pub fn resolve_holiday_dir(
  cfg: &Config,
  data_dir: &Path
) -> PathBuf {
  cfg
    .get_nonempty("holiday.location")
    .map(|raw| expand_tilde(&raw))
    .unwrap_or_else(|| {
      data_dir.join("holidays")
    })
}

/// `--plannerrc`, then `$PLANNERRC`
/// (`/dev/null` or empty disables the
/// rc file), then `~/.plannerrc` if it
/// exists.
fn locate_rc(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(
      &path.to_string_lossy()
    ));
  }

  if let Ok(raw) =
    std::env::var(RC_ENV_VAR)
  {
    let raw = raw.trim();
    if raw.is_empty()
      || raw == "/dev/null"
    {
      return None;
    }
    return Some(expand_tilde(raw));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!("no home directory; skipping plannerrc");
    return None;
  };
  Some(home.join(RC_FILE_NAME))
    .filter(|path| path.exists())
}

fn expand_tilde(raw: &str) -> PathBuf {
  if let Some(rest) =
    raw.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  PathBuf::from(raw)
}

fn parse_bool(raw: &str) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::{
    Config,
    resolve_data_dir,
    resolve_holiday_dir
  };

  #[test]
  fn loads_toml_rc_into_dotted_keys() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("plannerrc");
    fs::write(
      &rc,
      "# planner settings\n\
       color = false\n\
       timezone = \"Europe/Berlin\"\n\
       \n\
       [holiday]\n\
       country = \"DE\"\n\
       \n\
       [data]\n\
       location = \"/srv/planner\"\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load config");
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg.get("holiday.country"),
      Some("DE".to_string())
    );
    assert_eq!(
      cfg.get_nonempty("timezone"),
      Some("Europe/Berlin".to_string())
    );
    assert_eq!(
      resolve_data_dir(&cfg, None)
        .expect("data dir"),
      Path::new("/srv/planner")
    );
    assert_eq!(
      cfg.source.as_deref(),
      Some(rc.as_path())
    );
  }

  #[test]
  fn rejects_malformed_rc() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("plannerrc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    assert!(Config::load(Some(rc.as_path())).is_err());

    fs::write(&rc, "holiday = [1, 2]\n")
      .expect("write rc");
    assert!(Config::load(Some(rc.as_path())).is_err());
  }

  #[test]
  fn missing_rc_is_an_error_when_named() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("absent");
    assert!(Config::load(Some(rc.as_path())).is_err());
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "rc.holiday.country".to_string(),
        "US".to_string()
      ),
      ("color".to_string(), "no".to_string()),
    ]);
    assert_eq!(
      cfg.get("holiday.country"),
      Some("US".to_string())
    );
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(false)
    );
  }

  #[test]
  fn bool_settings_are_strict() {
    let mut cfg = Config::default();
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(true)
    );
    assert_eq!(
      cfg.get_bool("missing").expect("bool"),
      None
    );
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
  }

  #[test]
  fn holiday_dir_defaults_under_data() {
    let mut cfg = Config::default();
    assert_eq!(
      resolve_holiday_dir(
        &cfg,
        Path::new("/tmp/planner")
      ),
      Path::new("/tmp/planner/holidays")
    );

    cfg.apply_overrides(vec![(
      "holiday.location".to_string(),
      "/srv/holidays".to_string()
    )]);
    assert_eq!(
      resolve_holiday_dir(
        &cfg,
        Path::new("/tmp/planner")
      ),
      Path::new("/srv/holidays")
    );
  }

  #[test]
  fn data_flag_beats_rc() {
    let cfg = Config::default();
    assert_eq!(
      resolve_data_dir(
        &cfg,
        Some(Path::new("/tmp/elsewhere"))
      )
      .expect("data dir"),
      Path::new("/tmp/elsewhere")
    );
  }
}

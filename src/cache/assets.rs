//! The fixed set of shell resources that must always be servable offline.

use serde::Deserialize;

/// Ordered, deploy-time-fixed list of static resource paths.
///
/// Membership is tested against a normalized path (leading slash ensured),
/// so `index.html` and `/index.html` describe the same asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct StaticAssetSet {
  paths: Vec<String>,
}

impl StaticAssetSet {
  pub fn new(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
    let mut normalized: Vec<String> = Vec::new();
    for path in paths {
      let path = normalize(&path.into());
      if !normalized.contains(&path) {
        normalized.push(path);
      }
    }

    Self { paths: normalized }
  }

  /// The shell resources of the deployed application.
  pub fn default_shell() -> Self {
    Self::new([
      "/",
      "/index.html",
      "/styles.css",
      "/app.js",
      "/manifest.json",
      "/icons/icon-192.png",
      "/icons/icon-512.png",
    ])
  }

  pub fn contains(&self, path: &str) -> bool {
    let path = normalize(path);
    self.paths.iter().any(|p| *p == path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl Default for StaticAssetSet {
  fn default() -> Self {
    Self::default_shell()
  }
}

impl From<Vec<String>> for StaticAssetSet {
  fn from(paths: Vec<String>) -> Self {
    Self::new(paths)
  }
}

fn normalize(path: &str) -> String {
  let trimmed = path.trim();
  if trimmed.starts_with('/') {
    trimmed.to_string()
  } else {
    format!("/{}", trimmed)
  }
}

//! CLI subcommand implementations.

use color_eyre::Result;
use std::io::{self, Write};
use std::sync::Arc;

use crate::cache::{
  update_channel, FetchInterceptor, HttpRemote, LifecycleManager, LifecyclePhase, MemoryStores,
  OutboundRequest, RequestKey, ResponseSource, SqliteStores, StoreProvider,
};
use crate::config::Config;
use crate::notes::{NoteDraft, NotesClient};

fn open_stores(config: &Config) -> Result<Arc<SqliteStores>> {
  let path = config.data_dir()?.join("cache.db");
  Ok(Arc::new(SqliteStores::open_at(&path)?))
}

fn build_interceptor(
  config: &Config,
  stores: Arc<SqliteStores>,
) -> Result<FetchInterceptor<SqliteStores, HttpRemote>> {
  let remote = Arc::new(HttpRemote::new()?);
  Ok(FetchInterceptor::new(stores, remote, config.cache_policy()?))
}

/// Give the detached API snapshot write a chance to land before the
/// process exits.
async fn settle() {
  for _ in 0..8 {
    tokio::task::yield_now().await;
  }
}

/// Install the configured version set, then activate it unless asked to
/// leave it waiting.
pub async fn install(config: &Config, no_activate: bool, dry_run: bool) -> Result<()> {
  let remote = Arc::new(HttpRemote::new()?);

  if dry_run {
    let stores = Arc::new(MemoryStores::new());
    let (notifier, _events) = update_channel();
    let manager = LifecycleManager::new(
      Arc::clone(&stores),
      remote,
      config.cache_policy()?,
      notifier,
    );

    manager.install().await?;
    let fetched = stores.list_keys(manager.static_store())?.len();
    println!("Dry run: {} asset(s) fetched OK, nothing persisted.", fetched);
    return Ok(());
  }

  let stores = open_stores(config)?;
  let (notifier, mut events) = update_channel();
  let manager = LifecycleManager::new(
    Arc::clone(&stores),
    remote,
    config.cache_policy()?,
    notifier,
  );

  manager.install().await?;
  let cached = stores.list_keys(manager.static_store())?.len();
  println!("Installed {} ({} assets cached)", manager.static_store(), cached);

  if events.try_next().is_some() {
    println!("A newer version is now installed alongside the previously active one.");
  }

  if no_activate {
    println!(
      "{} is {}; run `offnote activate` to take over.",
      manager.version_token(),
      manager.phase()
    );
  } else {
    manager.activate();
    println!("Activated {}", manager.version_token());
  }

  Ok(())
}

/// Claim the configured version set and prune stores of other versions.
pub fn activate(config: &Config) -> Result<()> {
  let stores = open_stores(config)?;
  let remote = Arc::new(HttpRemote::new()?);
  let (notifier, _events) = update_channel();
  let manager = LifecycleManager::new(stores, remote, config.cache_policy()?, notifier);

  manager.activate();
  println!("Activated {}", manager.version_token());

  Ok(())
}

/// Show persisted stores, entry counts, and how they relate to the
/// configured version set.
pub fn status(config: &Config) -> Result<()> {
  let stores = open_stores(config)?;
  let policy = config.cache_policy()?;
  let names = stores.list_stores()?;

  if names.is_empty() {
    println!("No cache stores persisted. Run `offnote install` first.");
    return Ok(());
  }

  println!("{:<16} {:>8}  {}", "STORE", "ENTRIES", "STATE");
  for name in &names {
    let entries = stores.list_keys(name)?.len();
    let state = if *name == policy.static_store || *name == policy.api_store {
      "current".to_string()
    } else {
      LifecyclePhase::Redundant.to_string()
    };
    println!("{:<16} {:>8}  {}", name.to_string(), entries, state);
  }

  for configured in [&policy.static_store, &policy.api_store] {
    if !names.contains(configured) {
      println!("{:<16} {:>8}  not installed", configured.to_string(), "-");
    }
  }

  Ok(())
}

/// Delete every persisted store.
pub fn clear(config: &Config, skip_confirm: bool) -> Result<()> {
  let stores = open_stores(config)?;
  let names = stores.list_stores()?;

  if names.is_empty() {
    println!("No cache stores to clear.");
    return Ok(());
  }

  println!("This will remove {} store(s):", names.len());
  for name in &names {
    println!("  {}", name);
  }

  if !skip_confirm {
    print!("Are you sure? [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    if !input.trim().eq_ignore_ascii_case("y") {
      println!("Aborted.");
      return Ok(());
    }
  }

  let mut removed = 0;
  for name in names {
    if stores.delete_store(&name)? {
      removed += 1;
    }
  }
  println!("Cleared {} store(s).", removed);

  Ok(())
}

/// Run a single GET through the cache layer and print the result.
pub async fn get(config: &Config, target: &str) -> Result<()> {
  let stores = open_stores(config)?;
  let interceptor = build_interceptor(config, stores)?;

  let key = RequestKey::resolve("GET", &interceptor.policy().origin, target)?;
  let mut request = OutboundRequest::new(key);
  if let Some(token) = Config::api_token() {
    request = request.with_header("Authorization", format!("Bearer {}", token));
  }

  let result = interceptor.execute(request).await?;
  match result.response.header("content-type") {
    Some(content_type) => println!(
      "HTTP {} via {} ({})",
      result.response.status, result.source, content_type
    ),
    None => println!("HTTP {} via {}", result.response.status, result.source),
  }
  println!();
  println!("{}", result.response.body_text());

  settle().await;
  Ok(())
}

/// List notes, falling back to the cached snapshot when offline.
pub async fn notes(config: &Config, search: Option<&str>) -> Result<()> {
  let stores = open_stores(config)?;
  let interceptor = build_interceptor(config, stores)?;
  let client = NotesClient::new(interceptor, Config::api_token());

  let listing = client.list_notes(search).await?;

  if listing.source == ResponseSource::Offline {
    println!(
      "(offline: showing notes cached at {})",
      listing.fetched_at.format("%Y-%m-%d %H:%M")
    );
    println!();
  }

  if listing.notes.is_empty() {
    println!("No notes.");
    return Ok(());
  }

  for note in &listing.notes {
    let pin = if note.is_pinned { "*" } else { " " };
    println!(
      "{} {}  {}",
      pin,
      note.updated_at.format("%Y-%m-%d %H:%M"),
      note.title
    );
    if !note.tags.is_empty() {
      println!("    [{}]", note.tags.join(", "));
    }
  }

  println!();
  println!("Total: {} note(s)", listing.notes.len());

  settle().await;
  Ok(())
}

fn notes_client(config: &Config) -> Result<NotesClient<SqliteStores, HttpRemote>> {
  let stores = open_stores(config)?;
  let interceptor = build_interceptor(config, stores)?;
  Ok(NotesClient::new(interceptor, Config::api_token()))
}

/// Comma-separated tags, trimmed, empties dropped.
fn parse_tags(tags: Option<&str>) -> Vec<String> {
  tags
    .unwrap_or_default()
    .split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(String::from)
    .collect()
}

/// Create a note.
pub async fn add(
  config: &Config,
  title: String,
  content: String,
  tags: Option<&str>,
) -> Result<()> {
  let client = notes_client(config)?;
  let note = client
    .create_note(&NoteDraft {
      title,
      content,
      tags: parse_tags(tags),
    })
    .await?;

  println!("Created note {} ({})", note.id, note.title);
  Ok(())
}

/// Replace a note's title, content, and tags.
pub async fn edit(
  config: &Config,
  id: &str,
  title: String,
  content: String,
  tags: Option<&str>,
) -> Result<()> {
  let client = notes_client(config)?;
  let note = client
    .update_note(
      id,
      &NoteDraft {
        title,
        content,
        tags: parse_tags(tags),
      },
    )
    .await?;

  println!("Updated note {} ({})", note.id, note.title);
  Ok(())
}

/// Toggle a note's pin.
pub async fn pin(config: &Config, id: &str) -> Result<()> {
  let client = notes_client(config)?;
  client.toggle_pin(id).await?;
  println!("Toggled pin on note {}", id);
  Ok(())
}

/// Delete a note.
pub async fn rm(config: &Config, id: &str, skip_confirm: bool) -> Result<()> {
  if !skip_confirm {
    print!("Delete note {}? [y/N] ", id);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    if !input.trim().eq_ignore_ascii_case("y") {
      println!("Aborted.");
      return Ok(());
    }
  }

  let client = notes_client(config)?;
  client.delete_note(id).await?;
  println!("Deleted note {}", id);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_tags() {
    assert_eq!(parse_tags(None), Vec::<String>::new());
    assert_eq!(parse_tags(Some("")), Vec::<String>::new());
    assert_eq!(
      parse_tags(Some("work, ideas ,, later")),
      vec!["work", "ideas", "later"]
    );
  }
}

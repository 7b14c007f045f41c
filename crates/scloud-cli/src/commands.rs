use std::fs;
use std::io::Write;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use scloud_pool::{Database, Pool};
use scloud_revision::RevisionStore;
use scloud_types::Revision;

use crate::cli::*;
use crate::config::AppConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_file = data;
    }
    debug!(
        data_file = %config.data_file.display(),
        max_size = config.pool.max_size,
        require_commit_message = config.store.require_commit_message,
        "configuration loaded"
    );

    let (pool, store) = open_store(&config)?;
    let out = Output(cli.format);

    let result = match cli.command {
        Command::Page(cmd) => cmd_page(&store, out, cmd),
        Command::Revision(cmd) => cmd_revision(&store, out, cmd),
        Command::Verify(args) => cmd_verify(&store, out, args),
        Command::Status => cmd_status(&store, out),
    };
    pool.close();
    if let Err(e) = &result {
        debug!(error = %e, "command failed");
    }
    result
}

/// Open the database named by `config` and build a store over a new pool.
fn open_store(config: &AppConfig) -> anyhow::Result<(Pool, RevisionStore)> {
    let database = Database::open(&config.data_file)
        .with_context(|| format!("opening {}", config.data_file.display()))?;
    let counts = database.counts();
    info!(
        path = %config.data_file.display(),
        pages = counts.pages,
        revisions = counts.revisions,
        "database opened"
    );
    let pool = Pool::new(database, config.pool.clone())?;
    let store = RevisionStore::new(pool.clone(), config.store.clone());
    Ok((pool, store))
}

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn emit<T: Serialize>(self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.0 {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

fn cmd_page(store: &RevisionStore, out: Output, cmd: PageCommand) -> anyhow::Result<()> {
    match cmd {
        PageCommand::Create(args) => {
            let content = fs::read(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let page_id =
                store.create_page(args.user, args.group, &args.name, &content, &args.message)?;
            let page = store.page(page_id)?;
            out.emit(&page, || {
                println!(
                    "{} Created page {} ({})",
                    "✓".green().bold(),
                    page_id.to_string().yellow(),
                    page.name.bold()
                );
                if let Some(rev) = page.latest_revision_id {
                    println!("  Revision: {}", rev.to_string().yellow());
                }
                println!("  Size: {} bytes", content.len());
            })
        }
        PageCommand::List(args) => {
            let pages = store.pages_in_group(args.group)?;
            out.emit(&pages, || {
                if pages.is_empty() {
                    println!("No pages in group {}.", args.group);
                }
                for page in &pages {
                    let latest = page
                        .latest_revision_id
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{:>6}  {}  {}  (latest {})",
                        page.id.to_string().yellow(),
                        page.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                        page.name.bold(),
                        latest
                    );
                }
            })
        }
        PageCommand::Show(args) => {
            let page = store.page(args.page)?;
            let (latest, content) = store.latest_content(args.page)?;
            #[derive(Serialize)]
            struct Shown<'a> {
                page: &'a scloud_types::Page,
                latest: &'a Revision,
                size: usize,
            }
            let shown = Shown { page: &page, latest: &latest, size: content.len() };
            out.emit(&shown, || {
                println!("Page {} {}", page.id.to_string().yellow().bold(), page.name.bold());
                println!("  Group: {}", page.group_id);
                println!("  Created: {}", page.created_at.to_rfc3339());
                println!(
                    "  Latest: {} by user {}",
                    latest.id.to_string().yellow(),
                    latest.committed_by
                );
                println!("  Message: {}", latest.commit_message);
                println!("  Size: {} bytes", content.len());
            })
        }
        PageCommand::Delete(args) => {
            let report = store.delete_page(args.page)?;
            out.emit(&report, || {
                println!(
                    "{} Deleted page {}",
                    "✓".green().bold(),
                    args.page.to_string().yellow()
                );
                println!("  Revisions removed: {}", report.revisions_deleted);
                println!("  Blobs removed: {}", report.blobs_deleted);
                if !report.is_complete() {
                    println!(
                        "  {} {} revision(s) and {} blob(s) were already missing",
                        "warning:".yellow().bold(),
                        report.missing_revisions.len(),
                        report.missing_blobs.len()
                    );
                }
            })
        }
    }
}

fn cmd_revision(store: &RevisionStore, out: Output, cmd: RevisionCommand) -> anyhow::Result<()> {
    match cmd {
        RevisionCommand::Append(args) => {
            let content = fs::read(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let parent = match args.parent {
                Some(parent) => parent,
                None => store.latest_revision(args.page)?,
            };
            let revision_id =
                store.append_revision(args.user, args.page, parent, &content, &args.message)?;
            let revision = store.revision(revision_id)?;
            out.emit(&revision, || {
                println!(
                    "{} Revision {} appended to page {}",
                    "✓".green().bold(),
                    revision_id.to_string().yellow(),
                    args.page
                );
                println!("  Parent: {}", parent);
                println!("  Size: {} bytes", content.len());
            })
        }
        RevisionCommand::Log(args) => {
            let history = store.history(args.page)?;
            out.emit(&history, || {
                for entry in history.iter().rev() {
                    let rev = &entry.revision;
                    let marker = if entry.is_latest {
                        " (latest)".green().to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        "{} {}{}",
                        format!("#{}", entry.commit_number).bold(),
                        rev.id.to_string().yellow(),
                        marker
                    );
                    let parent = rev
                        .parent_revision_id
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "  Parent: {}  User: {}  Date: {}",
                        parent,
                        rev.committed_by,
                        rev.created_at.to_rfc3339().dimmed()
                    );
                    println!("  {}", rev.commit_message);
                }
            })
        }
        RevisionCommand::Cat(args) => {
            let content = store.revision_content(args.revision)?;
            match &args.output {
                Some(path) => {
                    fs::write(path, &content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!(
                        "{} Wrote {} bytes to {}",
                        "✓".green(),
                        content.len(),
                        path.display()
                    );
                }
                None => std::io::stdout().write_all(&content)?,
            }
            Ok(())
        }
    }
}

fn cmd_verify(store: &RevisionStore, out: Output, args: VerifyArgs) -> anyhow::Result<()> {
    let report = store.verify_page(args.page)?;
    out.emit(&report, || {
        if report.is_clean() {
            println!(
                "{} Page {}: {} blob(s) verified",
                "✓".green().bold(),
                args.page,
                report.checked
            );
        } else {
            println!(
                "{} Page {}: {} of {} blob(s) corrupted",
                "✗".red().bold(),
                args.page,
                report.corrupted.len(),
                report.checked
            );
            for rev in &report.corrupted {
                println!("  revision {}", rev.to_string().red());
            }
        }
    })?;
    if !report.is_clean() {
        anyhow::bail!("checksum mismatch on page {}", args.page);
    }
    Ok(())
}

fn cmd_status(store: &RevisionStore, out: Output) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct Status {
        pool: scloud_pool::PoolStatus,
        tables: scloud_pool::TableCounts,
    }
    let status = Status {
        pool: store.pool().status(),
        tables: store.pool().database().counts(),
    };
    out.emit(&status, || {
        let db = store
            .pool()
            .database()
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".into());
        println!("Database: {}", db.bold());
        println!(
            "Pool: {} open, {} idle, {} in use, max {}",
            status.pool.total, status.pool.idle, status.pool.in_use, status.pool.max_size
        );
        println!(
            "Tables: {} pages, {} revisions, {} blobs",
            status.tables.pages, status.tables.revisions, status.tables.blobs
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scloud_pool::PoolConfig;
    use scloud_types::{GroupId, UserId};

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_file: dir.join("scloud.db"),
            pool: PoolConfig {
                max_size: 2,
                min_idle: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn open_store_persists_between_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let (pool, store) = open_store(&config).unwrap();
        let page = store
            .create_page(UserId::new(1), GroupId::new(2), "a.txt", b"hello", "init")
            .unwrap();
        pool.close();

        let (pool, store) = open_store(&config).unwrap();
        assert_eq!(store.latest_content(page).unwrap().1, b"hello");
        assert_eq!(pool.database().counts().pages, 1);
        pool.close();
    }

    #[test]
    fn open_store_rejects_unreadable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.data_file, b"not a snapshot").unwrap();
        assert!(open_store(&config).is_err());
    }
}

use std::io::Write;

use anyhow::{bail, Result};
use chrono::Utc;

use marksync_lib::sync::{
    BackupProfile, BatchReport, DiffItem, SyncDirection, SyncError, SyncPreview, SyncReport,
};

use crate::app::App;
use crate::{Direction, OutputFormat};

fn format_path(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.join("/")
    }
}

fn print_items(marker: char, items: &[DiffItem]) {
    for item in items {
        let moved = item
            .old_path
            .as_ref()
            .map(|old| format!(" (from {})", format_path(old)))
            .unwrap_or_default();
        let renamed = item
            .old_title
            .as_ref()
            .map(|old| format!(" (was \"{}\")", old))
            .unwrap_or_default();
        println!(
            "  {} {}  {}  [{}]{}{}",
            marker,
            item.title,
            item.url,
            format_path(&item.path),
            renamed,
            moved
        );
    }
}

fn print_preview(preview: &SyncPreview) {
    let (from, to) = match preview.direction {
        SyncDirection::Push => ("local", "backup"),
        SyncDirection::Pull => ("backup", "local"),
    };
    println!(
        "{} '{}': {} -> {} ({} local, {} in backup)",
        preview.direction,
        preview.profile,
        from,
        to,
        preview.local_bookmarks,
        preview.remote_bookmarks
    );
    if !preview.diff.has_changes() {
        println!("  no changes");
        return;
    }
    print_items('+', &preview.diff.added);
    print_items('-', &preview.diff.removed);
    print_items('~', &preview.diff.modified);
    println!("  {}", preview.diff.summary());
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn sync_failure(error: SyncError) -> anyhow::Error {
    if let SyncError::PartialFailure { errors, .. } = &error {
        for e in errors {
            eprintln!("  {:?} {}: {}", e.operation, e.target, e.message);
        }
    }
    anyhow::anyhow!("{} ({})", error.user_message(), error)
}

fn print_report(report: &SyncReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Plain => println!("{} in {} ms", report.message(), report.duration_ms),
    }
    Ok(())
}

fn print_batch(report: &BatchReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Plain => {
            for r in &report.succeeded {
                println!("  ok      {}", r.message());
            }
            for f in &report.failed {
                println!("  failed  '{}': {}", f.profile, f.category.user_message());
            }
            println!("{}", report.message());
        }
    }
    if !report.is_success() {
        bail!("{} backups failed", report.failed.len());
    }
    Ok(())
}

/// Record the sync time on every profile that succeeded.
fn stamp(app: &mut App, names: &[&str], direction: SyncDirection) -> Result<()> {
    let now = Utc::now();
    for name in names {
        let profile = app.settings.profile_mut(name)?;
        match direction {
            SyncDirection::Push => profile.last_push = Some(now),
            SyncDirection::Pull => profile.last_pull = Some(now),
        }
    }
    app.save_settings()
}

pub async fn run_diff(app: &App, profile_name: &str, direction: Direction, format: &OutputFormat) -> Result<()> {
    let profile = app.profile(profile_name)?;
    let manager = app.manager();
    let preview = match direction {
        Direction::Push => manager.preview_push(&profile).await,
        Direction::Pull => manager.preview_pull(&profile).await,
    }
    .map_err(sync_failure)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Plain => print_preview(&preview),
    }
    Ok(())
}

async fn confirm_single(app: &App, profile: &BackupProfile, direction: SyncDirection) -> Result<bool> {
    let manager = app.manager();
    let preview = match direction {
        SyncDirection::Push => manager.preview_push(profile).await,
        SyncDirection::Pull => manager.preview_pull(profile).await,
    }
    .map_err(sync_failure)?;
    print_preview(&preview);
    confirm(&format!("Continue with {}?", direction))
}

fn confirm_batch(profiles: &[BackupProfile], direction: SyncDirection) -> Result<bool> {
    let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
    confirm(&format!("{} {} backups ({})?", direction, profiles.len(), names.join(", ")))
}

pub async fn run_push(
    app: &mut App,
    profile: Option<&str>,
    all: bool,
    yes: bool,
    format: &OutputFormat,
) -> Result<()> {
    let profiles = app.select_profiles(profile, all)?;

    if let [profile] = profiles.as_slice() {
        if !yes && !confirm_single(app, profile, SyncDirection::Push).await? {
            println!("Cancelled");
            return Ok(());
        }
        let report = app.manager().push(profile).await.map_err(sync_failure)?;
        stamp(app, &[profile.name.as_str()], SyncDirection::Push)?;
        return print_report(&report, format);
    }

    if !yes && !confirm_batch(&profiles, SyncDirection::Push)? {
        println!("Cancelled");
        return Ok(());
    }
    let report = app.manager().push_all(&profiles).await;
    let names: Vec<&str> = report.succeeded.iter().map(|r| r.profile.as_str()).collect();
    stamp(app, &names, SyncDirection::Push)?;
    print_batch(&report, format)
}

pub async fn run_pull(
    app: &mut App,
    profile: Option<&str>,
    all: bool,
    yes: bool,
    full_replace: bool,
    format: &OutputFormat,
) -> Result<()> {
    let profiles = app.select_profiles(profile, all)?;

    if let [profile] = profiles.as_slice() {
        if !yes && !confirm_single(app, profile, SyncDirection::Pull).await? {
            println!("Cancelled");
            return Ok(());
        }
        let manager = app.manager();
        let result = if full_replace {
            manager.pull_full_replace(profile).await
        } else {
            manager.pull(profile).await
        };
        let report = result.map_err(sync_failure)?;
        stamp(app, &[profile.name.as_str()], SyncDirection::Pull)?;
        return print_report(&report, format);
    }

    if !yes && !confirm_batch(&profiles, SyncDirection::Pull)? {
        println!("Cancelled");
        return Ok(());
    }
    let report = app.manager().pull_all(&profiles).await;
    let names: Vec<&str> = report.succeeded.iter().map(|r| r.profile.as_str()).collect();
    stamp(app, &names, SyncDirection::Pull)?;
    print_batch(&report, format)
}

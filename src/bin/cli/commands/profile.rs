use anyhow::Result;

use marksync_lib::sync::BackupProfile;

use crate::app::App;
use crate::OutputFormat;

pub fn run_add(
    app: &mut App,
    name: &str,
    gist_id: &str,
    file_name: Option<String>,
    folder: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let mut profile = BackupProfile::new(name, gist_id);
    if let Some(file_name) = file_name {
        profile.file_name = file_name;
    }
    if let Some(folder) = folder {
        profile = profile.with_local_folder(folder);
    }

    app.settings.add_profile(profile.clone())?;
    app.save_settings()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        OutputFormat::Plain => {
            println!("Added profile '{}' ({})", profile.name, profile.id);
            println!("Store a token with: marksync-cli login --profile {} --token <token>", profile.name);
        }
    }
    Ok(())
}

pub fn run_list(app: &App, format: &OutputFormat) -> Result<()> {
    let profiles = &app.settings.profiles;

    match format {
        OutputFormat::Json => {
            let output: Vec<_> = profiles
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "profile": p,
                        "hasToken": app.credentials.token(p.id).is_some(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if profiles.is_empty() {
                println!("(no profiles)");
                return Ok(());
            }
            for p in profiles {
                let scope = p.local_folder.as_deref().filter(|_| p.is_folder_scoped()).unwrap_or("(all bookmarks)");
                let disabled = if p.enabled { "" } else { " [disabled]" };
                let token = if app.credentials.token(p.id).is_some() { "" } else { " [no token]" };
                println!("{}{}{}", p.name, disabled, token);
                println!("    gist:   {}/{}", p.gist_id, p.file_name);
                println!("    scope:  {}", scope);
                if let Some(at) = p.last_push {
                    println!("    pushed: {}", at.format("%Y-%m-%d %H:%M"));
                }
                if let Some(at) = p.last_pull {
                    println!("    pulled: {}", at.format("%Y-%m-%d %H:%M"));
                }
            }
        }
    }
    Ok(())
}

pub fn run_remove(app: &mut App, name: &str) -> Result<()> {
    let removed = app.settings.remove_profile(name)?;
    app.save_settings()?;
    app.credentials.delete_token(removed.id);
    println!("Removed profile '{}'", removed.name);
    Ok(())
}

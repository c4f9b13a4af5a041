use anyhow::{bail, Context, Result};

use crate::app::App;
use crate::OutputFormat;

fn read_token(token: &str) -> Result<String> {
    if token != "-" {
        return Ok(token.trim().to_string());
    }
    let mut buf = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf).context("Failed to read token from stdin")?;
    Ok(buf.trim().to_string())
}

/// Store the token, then check it against GitHub.
pub async fn run_login(app: &App, profile_name: &str, token: &str) -> Result<()> {
    let profile = app.profile(profile_name)?;
    let token = read_token(token)?;
    if token.is_empty() {
        bail!("Token is empty");
    }

    app.credentials
        .store_token(profile.id, &token)
        .context("Failed to store token")?;

    match app.manager().verify_remote(&profile).await {
        Ok(Some(user)) => println!("Logged in as {} for '{}'", user.display_name, profile.name),
        Ok(None) => println!("Token stored for '{}', but GitHub rejected it", profile.name),
        Err(e) => {
            log::warn!("Token check failed: {}", e);
            println!("Token stored for '{}' (could not verify: {})", profile.name, e.user_message());
        }
    }
    Ok(())
}

pub async fn run_whoami(app: &App, profile_name: &str, format: &OutputFormat) -> Result<()> {
    let profile = app.profile(profile_name)?;
    let identity = match app.manager().verify_remote(&profile).await {
        Ok(identity) => identity,
        Err(e) => bail!("{} ({})", e.user_message(), e),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&identity)?),
        OutputFormat::Plain => match identity {
            Some(user) => println!("{}", user.display_name),
            None => bail!("Not authenticated. Run `marksync-cli login --profile {}`.", profile.name),
        },
    }
    Ok(())
}

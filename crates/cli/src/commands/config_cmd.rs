//! `skiff config`: Configuration management commands.

use skiff_config::Settings;

const REDACTED: &str = "[REDACTED]";

/// The settings with every credential replaced by a placeholder.
pub fn redacted(settings: &Settings) -> Settings {
    let mut shown = settings.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some(REDACTED.into());
    }
    if shown.search.api_key.is_some() {
        shown.search.api_key = Some(REDACTED.into());
    }
    shown
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(&settings))?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Settings::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if let Err(e) = settings.require_model_endpoint() {
        warnings.push(e.to_string());
    }
    if settings.api_key.is_none() {
        warnings.push("No API key set (fine for local servers; otherwise set SKIFF_API_KEY)".to_string());
    }
    if settings.search_api_key().is_none() {
        warnings.push("No search API key set: WebSearch and ExtractPageContent will fail (set TAVILY_API_KEY)".to_string());
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Endpoint:   {}", settings.api_url.as_deref().unwrap_or("(unset)"));
    println!("   Model:      {}", settings.model.as_deref().unwrap_or("(unset)"));
    println!("   Iterations: {}", settings.max_iterations);
    println!("   Memory:     {}", if settings.features.memory { "on" } else { "off" });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_credentials_only() {
        let mut settings = Settings {
            api_key: Some("sk-secret".into()),
            model: Some("gpt-4o".into()),
            ..Settings::default()
        };
        settings.search.api_key = Some("tvly-secret".into());

        let shown = toml::to_string_pretty(&redacted(&settings)).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(!shown.contains("tvly-secret"));
        assert!(shown.contains(REDACTED));
        assert!(shown.contains("gpt-4o"));

        let bare = redacted(&Settings::default());
        assert!(bare.api_key.is_none());
    }
}
